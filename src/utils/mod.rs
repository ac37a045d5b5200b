pub mod bitmap;
pub mod log;
pub mod reader;
pub mod test_utils;
