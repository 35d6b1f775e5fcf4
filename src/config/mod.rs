mod settings;

pub use settings::{Command, Config, RunArgs, Settings};
