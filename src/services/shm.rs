//! POSIX shared-memory segments.
//!
//! A table key maps to a named segment (`/panemux-<key>`), so a coordinator
//! and its workers rendezvous through the OS by key alone. The creator uses
//! exclusive mode: colliding with a leftover segment is reported, never
//! silently reused.

use std::fs::File;
use std::io;

use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;

use crate::domain::TableKey;
use crate::error::{ResourceError, ResourceResult};

/// One mapped shared-memory segment.
///
/// The mapping lives as long as this value; `unlink` only removes the OS
/// name, so an unlinked segment stays usable by processes already attached.
pub struct ShmSegment {
    key: TableKey,
    base: *mut u8,
    len: usize,
    _map: MmapMut,
}

// The mapping is owned by this value and its base address never moves; all
// cross-process access goes through atomics derived from `base`.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create and map a fresh segment of exactly `len` bytes.
    ///
    /// Fails with `KeyCollision` if a segment for this key already exists.
    pub fn create(key: TableKey, len: usize) -> ResourceResult<Self> {
        let name = key.segment_name();
        let fd = shm_open(
            name.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|errno| create_error(key, errno))?;
        match Self::size_and_map(key, File::from(fd), len) {
            Ok(segment) => Ok(segment),
            Err(err) => {
                // don't leave a nascent segment holding the name
                let _ = shm_unlink(name.as_str());
                Err(err)
            }
        }
    }

    fn size_and_map(key: TableKey, file: File, len: usize) -> ResourceResult<Self> {
        file.set_len(len as u64)
            .map_err(|source| ResourceError::Os { key, source })?;
        Self::map(key, file, len)
    }

    /// Map an existing segment, verifying its size.
    ///
    /// A creator that has opened but not yet sized its segment shows up here
    /// as a `SizeMismatch` with `actual` 0; attach loops treat that the same
    /// as `NotFound` and retry.
    pub fn attach(key: TableKey, expected_len: usize) -> ResourceResult<Self> {
        let name = key.segment_name();
        let fd = shm_open(name.as_str(), OFlag::O_RDWR, Mode::empty())
            .map_err(|errno| open_error(key, errno))?;
        let file = File::from(fd);
        let actual = file
            .metadata()
            .map_err(|source| ResourceError::Os { key, source })?
            .len();
        if actual != expected_len as u64 {
            return Err(ResourceError::SizeMismatch {
                key,
                expected: expected_len as u64,
                actual,
            });
        }
        Self::map(key, file, expected_len)
    }

    fn map(key: TableKey, file: File, len: usize) -> ResourceResult<Self> {
        let mut map = unsafe {
            MmapOptions::new()
                .len(len)
                .map_mut(&file)
                .map_err(|source| ResourceError::Os { key, source })?
        };
        let base = map.as_mut_ptr();
        Ok(Self {
            key,
            base,
            len,
            _map: map,
        })
    }

    /// Remove the segment's OS name.
    ///
    /// Existing mappings stay valid until their owners drop them; only new
    /// attaches are cut off.
    pub fn unlink(&self) -> ResourceResult<()> {
        shm_unlink(self.key.segment_name().as_str()).map_err(|errno| open_error(self.key, errno))
    }

    pub fn key(&self) -> TableKey {
        self.key
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }

    pub(crate) fn base_ptr(&self) -> *mut u8 {
        self.base
    }
}

fn create_error(key: TableKey, errno: Errno) -> ResourceError {
    match errno {
        Errno::EEXIST => ResourceError::KeyCollision(key),
        Errno::EACCES | Errno::EPERM => ResourceError::PermissionDenied(key),
        other => ResourceError::Os {
            key,
            source: io::Error::from_raw_os_error(other as i32),
        },
    }
}

fn open_error(key: TableKey, errno: Errno) -> ResourceError {
    match errno {
        Errno::ENOENT => ResourceError::NotFound(key),
        Errno::EACCES | Errno::EPERM => ResourceError::PermissionDenied(key),
        other => ResourceError::Os {
            key,
            source: io::Error::from_raw_os_error(other as i32),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Keys are derived from the test process id so parallel test binaries
    // never collide in the system shm namespace.
    fn test_key(tag: u32) -> TableKey {
        TableKey::new(std::process::id().wrapping_mul(1000).wrapping_add(tag))
    }

    #[test]
    fn test_create_attach_unlink_roundtrip() {
        let key = test_key(1);
        let created = ShmSegment::create(key, 64).unwrap();
        assert_eq!(created.byte_len(), 64);

        let attached = ShmSegment::attach(key, 64).unwrap();
        assert_eq!(attached.key(), key);
        assert_eq!(attached.byte_len(), 64);

        created.unlink().unwrap();
    }

    #[test]
    fn test_create_collision() {
        let key = test_key(2);
        let first = ShmSegment::create(key, 64).unwrap();
        let second = ShmSegment::create(key, 64);
        assert!(matches!(second, Err(ResourceError::KeyCollision(k)) if k == key));
        first.unlink().unwrap();
    }

    #[test]
    fn test_attach_missing_segment() {
        let key = test_key(3);
        assert!(matches!(
            ShmSegment::attach(key, 64),
            Err(ResourceError::NotFound(k)) if k == key
        ));
    }

    #[test]
    fn test_attach_size_mismatch() {
        let key = test_key(4);
        let created = ShmSegment::create(key, 64).unwrap();
        let attached = ShmSegment::attach(key, 128);
        assert!(matches!(
            attached,
            Err(ResourceError::SizeMismatch {
                expected: 128,
                actual: 64,
                ..
            })
        ));
        created.unlink().unwrap();
    }

    #[test]
    fn test_failed_create_releases_name() {
        let key = test_key(6);
        // usize::MAX cannot be a file length, so this fails after the name
        // already exists
        assert!(matches!(
            ShmSegment::create(key, usize::MAX),
            Err(ResourceError::Os { .. })
        ));

        // a failed create must not keep claiming the key
        let created = ShmSegment::create(key, 64).unwrap();
        created.unlink().unwrap();
    }

    #[test]
    fn test_unlink_cuts_off_new_attaches() {
        let key = test_key(5);
        let created = ShmSegment::create(key, 64).unwrap();
        created.unlink().unwrap();

        // The existing mapping is still usable, but the name is gone.
        assert_eq!(created.byte_len(), 64);
        assert!(matches!(
            ShmSegment::attach(key, 64),
            Err(ResourceError::NotFound(_))
        ));
        assert!(matches!(
            created.unlink(),
            Err(ResourceError::NotFound(_))
        ));
    }
}
