pub mod capture_source;
pub mod delivery_sink;
pub mod device_enumerator;
pub mod session_delegate;
pub mod transcoder;
