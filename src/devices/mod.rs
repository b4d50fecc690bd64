pub mod decoder;
pub mod flowmeter;

pub use decoder::{decode_float32, decode_float32_with_order, WordOrder};
pub use flowmeter::{Reading, FLOWMETER_REGISTER_COUNT, FLOWMETER_START_REGISTER};
