pub mod call;

pub use call::args::CallArgs;
pub use call::run_call;
