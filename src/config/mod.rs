pub mod settings;

pub use settings::{
    Config,
    LoopCount,
    OutputConfig,
    OutputFormat,
    ParityConfig,
    RegisterSelection,
    SerialConfig,
};
