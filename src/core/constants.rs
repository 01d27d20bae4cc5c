pub static VERSION: &str = env!("CARGO_PKG_VERSION");
pub static SUDO_PREPEND: &str = "sudo ";
pub static CHUNK_UPLOAD_BUFFER: usize = 40_960;

pub static DEFAULT_SSH_PORT: u16 = 22;
pub static DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
pub static DEFAULT_FLASH_TIMEOUT_SECS: u64 = 120;

pub static DEFAULT_BUILD_DIR: &str = ".pio/build";
pub static REMOTE_BINARIES_DIR: &str = "binaries";

pub static DEFAULT_PROGRAMMER: &str = "arduino";
pub static DEFAULT_FLASH_COMMAND: &str =
    "avrdude -c {programmer} -p {board} -P {port} -U flash:w:{image}";

pub static PROBE_COMMAND: &str = "uname -s";
