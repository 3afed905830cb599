//! First-byte peek plus ancillary (`SCM_RIGHTS`) metadata pickup.
//!
//! Grounded in `cockpitwebserver.c`'s `on_socket_input`: the very first
//! `recvmsg` on an accepted connection is done with `MSG_PEEK` so the byte
//! that decides TLS-vs-plaintext is still there for the real read that
//! follows, and any file descriptor handed over via `SCM_RIGHTS` is
//! decoded as a small JSON blob (a "memfd") and attached to the connection
//! as `metadata` for handlers to inspect later.
//!
//! This is inherently platform-specific (no dependency in the pack offers
//! a portable abstraction for ancillary data), so it is hand-rolled against
//! `libc` the same way the C original hand-rolls it against `GSocket`.
#![cfg(unix)]

use std::io;
use std::mem;
use std::os::unix::io::RawFd;

use libc;
use serde_json::Value;

/// Outcome of peeking the first byte of a freshly accepted connection.
pub struct FirstByte {
    /// `None` if the peer shut down before sending anything.
    pub byte: Option<u8>,
    /// A JSON object decoded from an `SCM_RIGHTS`-carried fd, if any arrived
    /// and its contents parsed as one. Anything else (no fd, decode
    /// failure) quietly yields `None` — this is best-effort side data, not
    /// part of the request.
    pub metadata: Option<Value>,
}

const CMSG_BUF_LEN: usize = 256;

/// Peek one byte of `fd`, picking up ancillary data along the way.
///
/// Returns `Ok(FirstByte { byte: None, .. })` on `EWOULDBLOCK` (caller
/// should retry once the socket is readable) as well as on a clean
/// zero-length read (peer closed before sending anything — same
/// "nothing's there yet" shape, disambiguated by the caller via a
/// subsequent real read).
pub fn peek_with_ancillary(fd: RawFd) -> io::Result<FirstByte> {
    let mut byte = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: byte.as_mut_ptr() as *mut libc::c_void,
        iov_len: 1,
    };
    let mut cmsg_buf = [0u8; CMSG_BUF_LEN];
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_buf.len() as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, libc::MSG_PEEK) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(FirstByte { byte: None, metadata: None });
        }
        return Err(err);
    }
    if n == 0 {
        return Ok(FirstByte { byte: None, metadata: None });
    }

    let metadata = extract_metadata(&msg);
    Ok(FirstByte { byte: Some(byte[0]), metadata: metadata })
}

fn extract_metadata(msg: &libc::msghdr) -> Option<Value> {
    let mut fds = Vec::new();
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::SOL_SOCKET && hdr.cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg);
                let payload_len = hdr.cmsg_len as usize - cmsg_data_offset();
                let count = payload_len / mem::size_of::<RawFd>();
                for i in 0..count {
                    let p = (data as *const RawFd).offset(i as isize);
                    fds.push(*p);
                }
            }
            cmsg = libc::CMSG_NXTHDR(msg as *const _ as *mut _, cmsg);
        }
    }

    for fd in fds {
        if let Some(value) = read_json_from_fd(fd) {
            return Some(value);
        }
    }
    None
}

fn cmsg_data_offset() -> usize {
    unsafe {
        let dummy: libc::cmsghdr = mem::zeroed();
        (libc::CMSG_DATA(&dummy) as usize) - ((&dummy) as *const _ as usize)
    }
}

fn read_json_from_fd(fd: RawFd) -> Option<Value> {
    use std::fs::File;
    use std::io::Read;
    use std::os::unix::io::FromRawFd;

    // The fd was handed to us via SCM_RIGHTS; we own it now.
    let mut file = unsafe { File::from_raw_fd(fd) };
    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).is_err() {
        return None;
    }
    match ::serde_json::from_slice::<Value>(&buf) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        _ => {
            debug!("metadata fd did not contain a JSON object");
            None
        }
    }
}
