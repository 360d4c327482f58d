use std::{process::ExitCode, sync::Arc};

use tracing::{error, info};
use wellplate_cycler::{
    app::{config::AppConfig, Application, RunExit},
    axis::simulated::SimulatedPortOpener,
    gpio::simulated::SimulatedGpio,
    journal::Journal,
};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Starting wellplate cycler");

    let config = match std::env::args().nth(1) {
        Some(path) => match AppConfig::load(&path).await {
            Ok(config) => config,
            Err(e) => {
                error!("{:#}", e);
                return ExitCode::FAILURE;
            }
        },
        None => AppConfig::default(),
    };

    let journal = Journal::bounded(config.simulation.journal_capacity);
    let opener = Arc::new(SimulatedPortOpener::new(
        config.simulation.available_ports.clone(),
        journal.clone(),
    ));
    let gpio = Arc::new(SimulatedGpio::new(journal));

    let _presser = config.simulation.auto_press_interval().map(|every| {
        gpio.clone()
            .spawn_auto_presses(config.gpio.button_pin, every, config.simulation.press_hold())
    });

    let app = Application::new(config, opener, gpio);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match app.run(shutdown).await {
        Ok(RunExit::Interrupted) => {
            info!("Wellplate cycler stopped");
            ExitCode::SUCCESS
        }
        Ok(RunExit::Completed) => {
            info!("Wellplate cycler finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
