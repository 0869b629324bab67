//! 系统调用错误码, 数值与Linux errno保持一致
//!
//! 内核内部所有可失败操作都返回 `SysR<T>`, 错误码原样传递到系统调用层

use core::fmt;

pub type SysR<T> = Result<T, SysError>;
pub type SysRet = SysR<usize>;

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(isize)]
pub enum SysError {
    /// Operation not permitted
    EPERM = 1,
    /// No such file or directory
    ENOENT = 2,
    /// No such process
    ESRCH = 3,
    /// Interrupted system call
    EINTR = 4,
    /// I/O error
    EIO = 5,
    /// No such device or address
    ENXIO = 6,
    /// Bad file number
    EBADF = 9,
    /// Try again
    EAGAIN = 11,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Bad address
    EFAULT = 14,
    /// Block device required
    ENOTBLK = 15,
    /// Device or resource busy
    EBUSY = 16,
    /// File exists
    EEXIST = 17,
    /// Cross-device link
    EXDEV = 18,
    /// No such device
    ENODEV = 19,
    /// Not a directory
    ENOTDIR = 20,
    /// Is a directory
    EISDIR = 21,
    /// Invalid argument
    EINVAL = 22,
    /// File table overflow
    ENFILE = 23,
    /// Too many open files
    EMFILE = 24,
    /// No space left on device
    ENOSPC = 28,
    /// Read-only file system
    EROFS = 30,
    /// Function not implemented
    ENOSYS = 38,
    /// Directory not empty
    ENOTEMPTY = 39,
    /// Operation not supported on transport endpoint
    EOPNOTSUPP = 95,
}

impl SysError {
    /// 系统调用返回值使用的负数形式
    pub fn as_ret(self) -> isize {
        -(self as isize)
    }
    pub fn code(self) -> isize {
        self as isize
    }
    /// 可以通过重试解决的错误
    pub fn is_transient(self) -> bool {
        matches!(self, Self::EAGAIN | Self::EINTR)
    }
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
