//! Pinning the calling thread to a CPU.

use std::io;

/// Restricts the calling thread to run on `cpu` only.
#[cfg(target_os = "linux")]
pub(crate) fn pin_current_thread(cpu: usize) -> io::Result<()> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);

        let result = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set,
        );

        if result != 0 {
            return Err(io::Error::from_raw_os_error(result));
        }
    }

    Ok(())
}

/// Restricts the calling thread to run on `cpu` only.
#[cfg(windows)]
pub(crate) fn pin_current_thread(cpu: usize) -> io::Result<()> {
    use windows_sys::Win32::System::Threading::{GetCurrentThread, SetThreadAffinityMask};

    if cpu >= usize::BITS as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cpu {cpu} does not fit in an affinity mask"),
        ));
    }

    let previous = unsafe { SetThreadAffinityMask(GetCurrentThread(), 1usize << cpu) };

    if previous == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Thread affinity is not available on this platform; pinning is a no-op.
#[cfg(not(any(target_os = "linux", windows)))]
pub(crate) fn pin_current_thread(_cpu: usize) -> io::Result<()> {
    Ok(())
}
