use thiserror::Error;

/// Result type for transfer operations
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors reported by the discovery and transfer engines.
///
/// None of these are fatal to the process: every failure is local to the
/// operation that detected it, and the engine stays usable for further
/// attempts. Each failure is also mirrored as a stored last-error string
/// and a `StatusMessage` event on the owning engine.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Device address text did not parse as a 48-bit hex address.
    #[error("Invalid device address")]
    InvalidAddress,

    /// The transport could not allocate a socket handle.
    #[error("Error creating socket")]
    SocketCreateFailed,

    /// Connect to the remote service failed; carries the platform error code.
    #[error("Connection failed with error: {0}")]
    ConnectFailed(i32),

    /// The 20-byte size header was not accepted in full by the transport.
    #[error("Failed to send file size")]
    HeaderSendFailed,

    /// A chunk write failed mid-stream. The connection is left open;
    /// disconnecting is the caller's responsibility.
    #[error("Error sending file data")]
    StreamSendFailed,

    /// Bytes sent did not match the declared file size.
    #[error("File transfer incomplete")]
    IncompleteTransfer,

    /// No file queued or no connection established.
    #[error("No file set or not connected")]
    NotReady,

    #[error("File does not exist")]
    FileNotFound,

    #[error("Cannot open file for reading")]
    FileOpenError,

    #[error("File is empty")]
    EmptyFile,

    #[error("Bind failed")]
    BindFailed,

    #[error("Listen failed")]
    ListenFailed,

    /// Received size header was unparseable or non-positive.
    #[error("Invalid file size received")]
    InvalidSizeHeader,

    /// Peer closed the connection before completing the handshake.
    #[error("Client disconnected before sending file size")]
    PrematureDisconnect,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
