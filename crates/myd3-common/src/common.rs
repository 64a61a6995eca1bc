// common.rs -- operator channel and error escalation

/// Recoverable error: the current operation is abandoned but the process
/// keeps running.
pub const ERR_DROP: i32 = 1;
/// Unrecoverable error: content or build is broken, terminate.
pub const ERR_FATAL: i32 = 2;

/// Reports an engine error. `ERR_FATAL` indicates a content/build error
/// (e.g. a fixed registry overflowing) and terminates; everything else is
/// logged and control returns to the caller.
pub fn com_error(code: i32, msg: &str) {
    if code == ERR_FATAL {
        log::error!("FATAL: {}", msg);
        panic!("{}", msg);
    }
    log::error!("{}", msg);
}
