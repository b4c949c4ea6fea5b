//! Kernel entropy sink capability.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use crate::error::AedError;

/// Path the kernel exposes its configured entropy pool size at, in bits.
/// Matches the original's `DEFAULT_POOLSIZE_FN`.
const POOLSIZE_FN: &str = "/proc/sys/kernel/random/poolsize";

/// Fallback pool size (bits) used only if `POOLSIZE_FN` can't be read.
const FALLBACK_POOL_MAX_BITS: u32 = 4096;

/// Abstract kernel-pool client. In broadband mode one emitted byte block is
/// submitted at a time; in spike mode one whitened 128-bit block at a time.
pub trait KernelEntropySink {
    /// Block until the kernel signals the pool can accept more entropy.
    /// A no-op for sinks (e.g. a plain file) that don't support it.
    fn wait_until_low(&self) -> Result<(), AedError>;

    /// Current pool fill, in bits. Returns `None` for sinks that don't
    /// support querying (a plain file sink).
    fn query_bits_available(&self) -> Result<Option<u32>, AedError>;

    /// Submit `buffer` with `declared_bits` of credited entropy.
    fn credit(&mut self, buffer: &[u8], declared_bits: u32) -> Result<(), AedError>;

    /// Compensate for kernels that don't fully honor a `credit` call's
    /// declared bit count; a no-op for sinks that don't support it.
    fn add_to_entropy_count(&mut self, _bits: u32) -> Result<(), AedError> {
        Ok(())
    }

    /// The kernel pool's maximum size in bits, used by the control loop to
    /// decide when a credit round is complete. `None` for sinks without a
    /// notion of a maximum (a plain file sink runs one round forever).
    fn pool_max_bits(&self) -> Option<u32>;
}

// Linux /dev/random ioctls (see random(4)): RNDGETENTCNT, RNDADDENTROPY,
// RNDADDTOENTCNT. Magic matches the kernel's <linux/random.h>.
const RNDGETENTCNT: libc::c_ulong = 0x8004_5200;
const RNDADDTOENTCNT: libc::c_ulong = 0x4004_5201;
const RNDADDENTROPY: libc::c_ulong = 0x4004_5203;

#[repr(C)]
struct RandPoolInfo {
    entropy_count: libc::c_int,
    buf_size: libc::c_int,
    buf: [u8; 0],
}

/// Kernel entropy sink backed by `/dev/random`'s ioctl interface.
pub struct LinuxKernelSink {
    file: File,
    pool_max_bits: u32,
}

impl LinuxKernelSink {
    pub fn open(path: &str) -> Result<Self, AedError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(AedError::SinkIo)?;
        let fd = file.as_raw_fd();
        let mut entropy_count: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(fd, RNDGETENTCNT, &mut entropy_count as *mut _) };
        if rc < 0 {
            return Err(AedError::SinkIo(std::io::Error::last_os_error()));
        }
        Ok(LinuxKernelSink {
            file,
            pool_max_bits: read_pool_max_bits(),
        })
    }
}

/// Read the kernel's configured entropy pool size, in bits, from
/// `/proc/sys/kernel/random/poolsize`. Falls back to
/// [`FALLBACK_POOL_MAX_BITS`] if the file can't be opened or parsed, logging
/// a warning rather than failing the whole sink open.
fn read_pool_max_bits() -> u32 {
    let mut contents = String::new();
    let read = OpenOptions::new()
        .read(true)
        .open(POOLSIZE_FN)
        .and_then(|mut f| f.read_to_string(&mut contents));
    match read {
        Ok(_) => match contents.trim().parse::<u32>() {
            Ok(bits) => bits,
            Err(e) => {
                log::warn!(
                    "couldn't parse \"{POOLSIZE_FN}\" contents \"{}\": {e}, using default {FALLBACK_POOL_MAX_BITS}",
                    contents.trim()
                );
                FALLBACK_POOL_MAX_BITS
            }
        },
        Err(e) => {
            log::warn!("couldn't read \"{POOLSIZE_FN}\": {e}, using default {FALLBACK_POOL_MAX_BITS}");
            FALLBACK_POOL_MAX_BITS
        }
    }
}

impl KernelEntropySink for LinuxKernelSink {
    fn wait_until_low(&self) -> Result<(), AedError> {
        let fd = self.file.as_raw_fd();
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pollfd, 1, -1) };
        if rc < 0 {
            return Err(AedError::SinkIo(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn query_bits_available(&self) -> Result<Option<u32>, AedError> {
        let fd = self.file.as_raw_fd();
        let mut entropy_count: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(fd, RNDGETENTCNT, &mut entropy_count as *mut _) };
        if rc < 0 {
            return Err(AedError::SinkIo(std::io::Error::last_os_error()));
        }
        Ok(Some(entropy_count as u32))
    }

    fn credit(&mut self, buffer: &[u8], declared_bits: u32) -> Result<(), AedError> {
        let fd = self.file.as_raw_fd();
        let layout = std::alloc::Layout::from_size_align(
            std::mem::size_of::<RandPoolInfo>() + buffer.len(),
            std::mem::align_of::<RandPoolInfo>(),
        )
        .expect("layout for rand_pool_info");
        unsafe {
            let ptr = std::alloc::alloc(layout) as *mut RandPoolInfo;
            (*ptr).entropy_count = declared_bits as libc::c_int;
            (*ptr).buf_size = buffer.len() as libc::c_int;
            let buf_ptr = (ptr as *mut u8).add(std::mem::size_of::<RandPoolInfo>());
            std::ptr::copy_nonoverlapping(buffer.as_ptr(), buf_ptr, buffer.len());
            let rc = libc::ioctl(fd, RNDADDENTROPY, ptr);
            std::alloc::dealloc(ptr as *mut u8, layout);
            if rc < 0 {
                return Err(AedError::SinkIo(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    fn add_to_entropy_count(&mut self, bits: u32) -> Result<(), AedError> {
        let fd = self.file.as_raw_fd();
        let mut count = bits as libc::c_int;
        let rc = unsafe { libc::ioctl(fd, RNDADDTOENTCNT, &mut count as *mut _) };
        if rc < 0 {
            return Err(AedError::SinkIo(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    fn pool_max_bits(&self) -> Option<u32> {
        Some(self.pool_max_bits)
    }
}

/// Alternative sink: an append-only file. Supports only `credit`; the other
/// operations are no-ops.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn open(path: &str) -> Result<Self, AedError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(AedError::SinkIo)?;
        Ok(FileSink { file })
    }
}

impl KernelEntropySink for FileSink {
    fn wait_until_low(&self) -> Result<(), AedError> {
        Ok(())
    }

    fn query_bits_available(&self) -> Result<Option<u32>, AedError> {
        Ok(None)
    }

    fn credit(&mut self, buffer: &[u8], _declared_bits: u32) -> Result<(), AedError> {
        self.file.write_all(buffer).map_err(AedError::SinkIo)?;
        self.file.flush().map_err(AedError::SinkIo)?;
        Ok(())
    }

    fn pool_max_bits(&self) -> Option<u32> {
        None
    }
}
