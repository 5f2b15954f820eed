//! Error types for netlink operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno}){}", ext_ack_suffix(.ext_ack))]
    Kernel {
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
        /// Extended-ack diagnostic text, when the kernel sent one.
        ext_ack: Option<String>,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel (positive).
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// A record was shorter than its fixed-size header or payload.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected length.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Appending would overflow the message's capacity. The message is unchanged.
    #[error("message exceeded bound of {capacity} bytes (needs {required})")]
    MessageFull {
        /// Capacity of the message buffer.
        capacity: usize,
        /// Length the append would have produced.
        required: usize,
    },

    /// The netlink stream lost framing: a length field disagrees with the
    /// bytes received, or bytes remain that belong to no message.
    ///
    /// There is no resynchronisation marker in netlink, so this is fatal.
    #[error("netlink framing error: {0}")]
    Framing(String),

    /// The socket returned zero bytes.
    #[error("EOF on netlink")]
    Eof,

    /// The socket was closed.
    #[error("netlink socket is closed")]
    Closed,

    /// A receive did not complete before the configured deadline.
    #[error("timed out waiting for netlink reply")]
    Timeout,

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid attribute format.
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Generic netlink family does not exist.
    #[error("generic netlink family not found: {name}")]
    FamilyNotFound {
        /// The family name that was queried.
        name: String,
    },

    /// Interface not found.
    #[error("interface not found: {name}")]
    InterfaceNotFound {
        /// The interface name that was not found.
        name: String,
    },
}

fn ext_ack_suffix(ext_ack: &Option<String>) -> String {
    match ext_ack {
        Some(msg) => format!(": {}", msg),
        None => String::new(),
    }
}

impl Error {
    /// Create a kernel error from a (negative) errno value as carried in
    /// `nlmsgerr.error`.
    pub fn from_errno(errno: i32) -> Self {
        let errno = errno.saturating_abs();
        let message = io::Error::from_raw_os_error(errno).to_string();
        Self::Kernel {
            errno,
            message,
            ext_ack: None,
        }
    }

    /// Create a kernel error that carries extended-ack text.
    pub fn from_errno_with_ext_ack(errno: i32, ext_ack: Option<String>) -> Self {
        match Self::from_errno(errno) {
            Self::Kernel { errno, message, .. } => Self::Kernel {
                errno,
                message,
                ext_ack,
            },
            other => other,
        }
    }

    /// Create a kernel error with operation context.
    pub fn from_errno_with_context(errno: i32, operation: impl Into<String>) -> Self {
        Self::from_errno(errno).with_context(operation)
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message, .. } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Whether the error means the conversation cannot continue.
    ///
    /// Framing corruption and EOF are fatal; binaries abort on them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::Eof)
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, etc.).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, libc::ENOENT | libc::ENODEV)
            }
            Self::InterfaceNotFound { .. } | Self::FamilyNotFound { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, libc::EPERM | libc::EACCES)
            }
            Self::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }

    /// Check if this is a "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    /// Check if this is a "device busy" error (EBUSY).
    pub fn is_busy(&self) -> bool {
        self.errno() == Some(libc::EBUSY)
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
