//! Per-user registry access (`HKEY_CURRENT_USER`).
//!
//! Used for the GPU preference and for finding Steam. Off Windows every
//! call fails with [`Error::Unavailable`].

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::{Error, Result};

pub trait Registry {
    /// Read a string value. `Ok(None)` when the key or value does not exist.
    fn get_string(&self, key: &str, name: &str) -> Result<Option<String>>;

    /// Write a string value, creating the key when needed.
    fn set_string(&self, key: &str, name: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct SystemRegistry;

#[cfg(windows)]
mod win32 {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS};
    use windows::Win32::System::Registry::{
        RegCloseKey, RegCreateKeyExW, RegGetValueW, RegSetValueExW, HKEY, HKEY_CURRENT_USER,
        KEY_SET_VALUE, REG_OPTION_NON_VOLATILE, REG_SZ, RRF_RT_REG_SZ,
    };

    use super::{Registry, SystemRegistry};
    use crate::error::{Error, Result};

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    impl Registry for SystemRegistry {
        fn get_string(&self, key: &str, name: &str) -> Result<Option<String>> {
            let (key, name) = (wide(key), wide(name));
            let mut size = 0u32;
            let status = unsafe {
                RegGetValueW(
                    HKEY_CURRENT_USER,
                    PCWSTR(key.as_ptr()),
                    PCWSTR(name.as_ptr()),
                    RRF_RT_REG_SZ,
                    None,
                    None,
                    Some(&mut size as *mut u32),
                )
            };
            if status == ERROR_FILE_NOT_FOUND {
                return Ok(None);
            }
            status.ok().map_err(|err| Error::Platform(err.to_string()))?;

            let mut buf = vec![0u16; (size as usize + 1) / 2];
            let status = unsafe {
                RegGetValueW(
                    HKEY_CURRENT_USER,
                    PCWSTR(key.as_ptr()),
                    PCWSTR(name.as_ptr()),
                    RRF_RT_REG_SZ,
                    None,
                    Some(buf.as_mut_ptr().cast()),
                    Some(&mut size as *mut u32),
                )
            };
            status.ok().map_err(|err| Error::Platform(err.to_string()))?;
            let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
            Ok(Some(String::from_utf16_lossy(&buf[..len])))
        }

        fn set_string(&self, key: &str, name: &str, value: &str) -> Result<()> {
            let (key, name, value) = (wide(key), wide(name), wide(value));
            let mut hkey = HKEY::default();
            unsafe {
                RegCreateKeyExW(
                    HKEY_CURRENT_USER,
                    PCWSTR(key.as_ptr()),
                    0,
                    PCWSTR::null(),
                    REG_OPTION_NON_VOLATILE,
                    KEY_SET_VALUE,
                    None,
                    &mut hkey,
                    None,
                )
            }
            .ok()
            .map_err(|err| Error::Platform(err.to_string()))?;

            let bytes: Vec<u8> = value.iter().flat_map(|c| c.to_le_bytes()).collect();
            let status =
                unsafe { RegSetValueExW(hkey, PCWSTR(name.as_ptr()), 0, REG_SZ, Some(&bytes)) };
            let closed = unsafe { RegCloseKey(hkey) };
            status.ok().map_err(|err| Error::Platform(err.to_string()))?;
            if closed != ERROR_SUCCESS {
                return Err(Error::Platform(format!("RegCloseKey failed: {:?}", closed)));
            }
            Ok(())
        }
    }
}

#[cfg(not(windows))]
impl Registry for SystemRegistry {
    fn get_string(&self, _key: &str, _name: &str) -> Result<Option<String>> {
        Err(Error::Unavailable("the Windows registry"))
    }

    fn set_string(&self, _key: &str, _name: &str, _value: &str) -> Result<()> {
        Err(Error::Unavailable("the Windows registry"))
    }
}

/// In-memory registry for testing.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    values: RefCell<HashMap<(String, String), String>>,
    read_only: bool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails, as if access were denied.
    pub fn read_only() -> Self {
        MemoryRegistry {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with(self, key: &str, name: &str, value: &str) -> Self {
        self.values
            .borrow_mut()
            .insert((key.to_owned(), name.to_owned()), value.to_owned());
        self
    }
}

impl Registry for MemoryRegistry {
    fn get_string(&self, key: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .borrow()
            .get(&(key.to_owned(), name.to_owned()))
            .cloned())
    }

    fn set_string(&self, key: &str, name: &str, value: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::Platform("access denied".into()));
        }
        self.values
            .borrow_mut()
            .insert((key.to_owned(), name.to_owned()), value.to_owned());
        Ok(())
    }
}
