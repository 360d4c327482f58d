pub mod app;
pub mod axis;
pub mod axis_controller;
pub mod gantry;
pub mod gpio;
pub mod journal;
pub mod sequencer;
