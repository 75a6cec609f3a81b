//! Emergency flush on fatal signals
//!
//! A fatal signal can arrive while the crashing thread holds the merge
//! lock, so this path takes no locks and performs no allocation: it walks
//! the record pool through a pre-armed raw pointer and writes a plain-text
//! dump with raw `write(2)` calls. Completeness is traded for safety; the
//! normal exporter is always preferred when available.

#![allow(dead_code)]

use crate::record::RecordPool;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

/// Upper bound for the pre-rendered dump path, NUL included.
const MAX_PATH_BYTES: usize = 512;

static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

struct EmergencySlot {
    /// Pool of the active session; null while disarmed.
    pool: AtomicPtr<RecordPool>,
    /// NUL-terminated dump path, rendered at arm time so the handler never
    /// builds a CString.
    path: std::cell::UnsafeCell<[u8; MAX_PATH_BYTES]>,
    path_len: AtomicUsize,
}

// SAFETY: `path` is written only while `pool` is null (disarmed) and read
// only after an Acquire load observes a non-null `pool` stored with
// Release afterwards.
unsafe impl Sync for EmergencySlot {}

static SLOT: EmergencySlot = EmergencySlot {
    pool: AtomicPtr::new(std::ptr::null_mut()),
    path: std::cell::UnsafeCell::new([0; MAX_PATH_BYTES]),
    path_len: AtomicUsize::new(0),
};

/// Arm the emergency path for a session: remember the pool and pre-render
/// the dump path (`<output>.partial`). Overwrites any previous arming.
pub(crate) fn arm(pool: *const RecordPool, output_path: &std::path::Path) {
    disarm();

    let rendered = render_path(output_path);
    // SAFETY: disarmed above, so no handler is reading the path buffer.
    let buf = unsafe { &mut *SLOT.path.get() };
    let len = rendered.len().min(MAX_PATH_BYTES - 1);
    buf[..len].copy_from_slice(&rendered[..len]);
    buf[len] = 0;
    SLOT.path_len.store(len, Ordering::Relaxed);
    SLOT.pool.store(pool as *mut RecordPool, Ordering::Release);
}

/// Disarm unconditionally.
pub(crate) fn disarm() {
    SLOT.pool.store(std::ptr::null_mut(), Ordering::SeqCst);
}

/// Disarm only if still armed for `pool` (context teardown while another
/// context has re-armed must not clobber the newer arming).
pub(crate) fn disarm_pool(pool: *const RecordPool) {
    let _ = SLOT.pool.compare_exchange(
        pool as *mut RecordPool,
        std::ptr::null_mut(),
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
}

fn render_path(output_path: &std::path::Path) -> Vec<u8> {
    let mut path = output_path.as_os_str().to_os_string();
    path.push(".partial");
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned().into_bytes()
    }
}

#[cfg(unix)]
mod imp {
    use super::*;
    use std::os::raw::c_int;

    const FATAL_SIGNALS: [c_int; 5] = [
        libc::SIGSEGV,
        libc::SIGBUS,
        libc::SIGILL,
        libc::SIGFPE,
        libc::SIGABRT,
    ];

    /// Install the fatal-signal handlers once, process-wide.
    pub(crate) fn install_handlers() {
        if HANDLERS_INSTALLED.swap(true, Ordering::SeqCst) {
            return;
        }
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = fatal_signal_handler as extern "C" fn(c_int) as usize;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);
            for sig in FATAL_SIGNALS {
                libc::sigaction(sig, &action, std::ptr::null_mut());
            }
        }
        tracing::debug!("emergency-flush signal handlers installed");
    }

    extern "C" fn fatal_signal_handler(sig: c_int) {
        // Reentry (a second fault inside the handler) skips straight to
        // re-raising with the default disposition.
        if !IN_HANDLER.swap(true, Ordering::SeqCst) {
            emergency_flush();
        }
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = libc::SIG_DFL;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(sig, &action, std::ptr::null_mut());
            libc::raise(sig);
        }
    }

    /// Write the armed pool's aggregates to the pre-rendered dump path.
    /// Allocation-free and lock-free. Returns true when a dump was written.
    pub(crate) fn emergency_flush() -> bool {
        let pool = SLOT.pool.load(Ordering::Acquire);
        if pool.is_null() {
            return false;
        }
        // SAFETY: path bytes were fully written before the pool pointer was
        // published; the buffer is NUL-terminated at arm time.
        let path = unsafe { (*SLOT.path.get()).as_ptr() as *const libc::c_char };
        let fd = unsafe {
            libc::open(
                path,
                libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                0o644 as libc::c_uint,
            )
        };
        if fd < 0 {
            return false;
        }

        write_all(fd, b"# strata emergency dump (truncated)\n");
        write_all(fd, b"# scope count min_ns max_ns sum_ns\n");

        // SAFETY: the pool outlives its arming (disarmed before drop) and
        // slots below the published length are initialized. The process is
        // crashing; a merge racing the walk can at worst skew one record's
        // relaxed-atomic scalars.
        let pool = unsafe { &*pool };
        for record in pool.iter() {
            let (label_ptr, label_len) = record.name().label_raw();
            // SAFETY: interned label bytes are live for the registry's
            // lifetime.
            unsafe {
                libc::write(fd, label_ptr as *const libc::c_void, label_len);
            }
            write_all(fd, b" ");
            write_u64(fd, record.count());
            write_all(fd, b" ");
            write_u64(fd, record.min_nanos());
            write_all(fd, b" ");
            write_u64(fd, record.max_nanos());
            write_all(fd, b" ");
            write_u64(fd, record.sum_nanos());
            write_all(fd, b"\n");
        }
        write_all(fd, b"# end\n");
        unsafe {
            libc::close(fd);
        }
        true
    }

    fn write_all(fd: c_int, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            let written =
                unsafe { libc::write(fd, bytes.as_ptr() as *const libc::c_void, bytes.len()) };
            if written <= 0 {
                return;
            }
            bytes = &bytes[written as usize..];
        }
    }

    fn write_u64(fd: c_int, value: u64) {
        let mut digits = [0u8; 20];
        let mut idx = digits.len();
        let mut rest = value;
        loop {
            idx -= 1;
            digits[idx] = b'0' + (rest % 10) as u8;
            rest /= 10;
            if rest == 0 {
                break;
            }
        }
        write_all(fd, &digits[idx..]);
    }
}

#[cfg(not(unix))]
mod imp {
    /// Signal-based emergency dumps are unix-only; other platforms rely on
    /// the autosave path.
    pub(crate) fn install_handlers() {}

    pub(crate) fn emergency_flush() -> bool {
        false
    }
}

pub(crate) use imp::{emergency_flush, install_handlers};

/// The arming slot is process-global; tests that arm it serialize here so
/// parallel test threads cannot clobber each other's dump target.
#[cfg(test)]
pub(crate) static TEST_ARM_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::registry::{scope_hash, ScopeRegistry};

    fn armed_pool(dir: &std::path::Path) -> (RecordPool, std::path::PathBuf) {
        let registry = ScopeRegistry::new(4);
        let mut pool = RecordPool::new(4);
        for (label, durations) in [("Update", vec![100u64, 300]), ("Render", vec![50])] {
            let id = registry.resolve(label, scope_hash(label));
            let idx = pool.allocate(registry.name(id).unwrap(), 8).unwrap();
            let record = pool.get_mut(idx).unwrap();
            for d in durations {
                record.record(d);
            }
        }
        let output = dir.join("session.trace.json");
        (pool, output)
    }

    fn arm_guard() -> std::sync::MutexGuard<'static, ()> {
        match TEST_ARM_LOCK.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn test_emergency_dump_contents() {
        let _guard = arm_guard();
        let dir = tempfile::tempdir().unwrap();
        let (pool, output) = armed_pool(dir.path());

        arm(&pool as *const RecordPool, &output);
        assert!(emergency_flush());
        disarm();

        let dump = std::fs::read_to_string(output.with_extension("json.partial")).unwrap();
        assert!(dump.starts_with("# strata emergency dump (truncated)\n"));
        assert!(dump.contains("Update 2 100 300 400\n"));
        assert!(dump.contains("Render 1 50 50 50\n"));
        assert!(dump.ends_with("# end\n"));
    }

    #[test]
    fn test_flush_without_arming_is_noop() {
        let _guard = arm_guard();
        disarm();
        assert!(!emergency_flush());
    }

    #[test]
    fn test_disarm_pool_matches_pointer() {
        let _guard = arm_guard();
        let dir = tempfile::tempdir().unwrap();
        let (pool_a, output) = armed_pool(dir.path());
        let (pool_b, _) = armed_pool(dir.path());

        arm(&pool_a as *const RecordPool, &output);
        // A stale context disarming someone else's arming must not clobber.
        disarm_pool(&pool_b as *const RecordPool);
        assert!(emergency_flush());

        disarm_pool(&pool_a as *const RecordPool);
        assert!(!emergency_flush());
    }
}
