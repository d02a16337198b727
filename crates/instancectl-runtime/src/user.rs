use crate::RuntimeError;
use std::ffi::CString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserIds {
    pub uid: u32,
    pub gid: u32,
}

/// Resolve a system user name to its uid and primary gid.
#[allow(unsafe_code)]
pub fn lookup_user(name: &str) -> Result<UserIds, RuntimeError> {
    let c_name = CString::new(name).map_err(|_| RuntimeError::UnknownUser(name.to_owned()))?;

    // SAFETY: c_name is a valid NUL-terminated string that outlives the call.
    let pw = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if pw.is_null() {
        return Err(RuntimeError::UnknownUser(name.to_owned()));
    }

    // SAFETY: a non-null result points to a passwd record that stays valid
    // until the next getpw* call on this thread; both fields are copied out
    // before anything else runs.
    let ids = unsafe {
        UserIds {
            uid: (*pw).pw_uid,
            gid: (*pw).pw_gid,
        }
    };
    Ok(ids)
}
