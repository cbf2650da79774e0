mod debug;
mod fail;
mod set_value;

pub use debug::DebugMessage;
pub use fail::Fail;
pub use set_value::SetValue;
