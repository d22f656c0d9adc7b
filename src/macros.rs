/// Print-style logging into a facility's ring buffer.
///
/// Expands to a call to [`Kdebug::log`](crate::Kdebug::log) and returns the
/// number of bytes written.
///
/// ```
/// let kdbg = kdebug::Kdebug::new();
/// kdebug::klog!(kdbg, "mount: fs={} ro={}\n", "gfs0", false);
/// ```
#[macro_export]
macro_rules! klog {
    ($kdbg:expr, $($arg:tt)*) => {
        $kdbg.log(format_args!($($arg)*))
    };
}
