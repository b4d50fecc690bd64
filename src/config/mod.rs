pub mod settings;

pub use settings::{
    ApiConfig,
    Config,
    DatabaseOutputConfig,
    FileOutputConfig,
    OutputConfig,
    ParityConfig,
    PollingConfig,
    SerialConfig,
};
