use crate::{errors::SdcError, Scalar};

mod channel;
mod serial;

pub use channel::ChannelComm;
pub use serial::SerialComm;

/// Number of message tags reserved per level; see [`tag_for`].
pub const TAGS_PER_LEVEL: usize = 16;

const BASE_TAG: usize = 1000;

/// Tag encoding for level-and-iteration scoped messages:
/// `base + level * TAGS_PER_LEVEL + iteration mod TAGS_PER_LEVEL`.
pub fn tag_for(level: usize, iteration: usize) -> usize {
    BASE_TAG + level * TAGS_PER_LEVEL + iteration % TAGS_PER_LEVEL
}

/// Bulk-synchronous message passing between the ranks of a time-parallel
/// block. One controller per rank; sends and receives are matched by
/// (peer, tag) and ordered per peer.
///
/// An MPI-backed implementation slots in behind this trait; the crate ships
/// the single-process identity transport and an in-process channel transport.
pub trait Communicator<T: Scalar> {
    fn rank(&self) -> usize;

    fn num_ranks(&self) -> usize;

    /// Blocking send of one state payload.
    fn send(&mut self, data: &[T], dest: usize, tag: usize) -> Result<(), SdcError>;

    /// Non-blocking send; the payload is buffered so the caller may reuse
    /// its storage immediately. Completion is awaited by [`wait_pending`].
    ///
    /// [`wait_pending`]: Communicator::wait_pending
    fn isend(&mut self, data: &[T], dest: usize, tag: usize) -> Result<(), SdcError>;

    /// Blocking receive into `data`.
    fn recv(&mut self, data: &mut [T], src: usize, tag: usize) -> Result<(), SdcError>;

    /// Non-blocking receive; returns whether a matching message was consumed.
    fn try_recv(&mut self, data: &mut [T], src: usize, tag: usize) -> Result<bool, SdcError>;

    /// Global reduction: true once every rank has passed `local = true` in
    /// the current round. Collective; every rank must call it once per round.
    fn all_converged(&mut self, local: bool) -> Result<bool, SdcError>;

    /// Wait for completion of all posted non-blocking sends.
    fn wait_pending(&mut self) -> Result<(), SdcError>;

    /// Drop undelivered messages after early termination of a block.
    fn drain(&mut self);
}
