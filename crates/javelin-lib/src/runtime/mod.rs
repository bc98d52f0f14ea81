pub mod locator;
pub mod probe;
pub mod scanner;

pub use locator::{find_local, LocateOptions};
pub use scanner::{scan, scan_lenient, InstalledRuntime};
