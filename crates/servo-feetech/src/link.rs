use crate::Result;

/// A blocking byte transport to the servo chain.
///
/// The bus owns exactly one link while connected and drops it on
/// disconnect, so the underlying handle is released on every exit path.
pub trait ServoLink: Send {
    /// Write the whole packet to the chain.
    fn transmit(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` from the chain, blocking up to the link's timeout.
    fn receive(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Discard any unread input (stale replies from an aborted exchange).
    fn drain(&mut self) -> Result<()>;
}
