/// Sets kernel `SO_SNDBUF` and `SO_RCVBUF` on a mio `TcpStream`.
/// Best-effort: failures are logged, not propagated, since a buffer size
/// the kernel won't honor isn't a connection-ending problem.
#[cfg(unix)]
pub(crate) fn set_socket_buf_size(stream: &mio::net::TcpStream, size: usize) {
    use std::os::fd::AsRawFd;
    let fd = stream.as_raw_fd();
    let size = size as libc::c_int;
    let len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    unsafe {
        let rc = libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, &size as *const _ as *const libc::c_void, len);
        if rc != 0 {
            tracing::warn!(%size, "failed to set SO_SNDBUF");
        }
        let rc = libc::setsockopt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, &size as *const _ as *const libc::c_void, len);
        if rc != 0 {
            tracing::warn!(%size, "failed to set SO_RCVBUF");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn set_socket_buf_size(_stream: &mio::net::TcpStream, _size: usize) {
    tracing::warn!("socket buffer sizing is only implemented on unix");
}
