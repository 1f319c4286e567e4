use std::collections::{HashMap, VecDeque};

use super::Communicator;
use crate::{errors::SdcError, Scalar};

/// Identity communicator for single-process runs: messages to self are
/// buffered locally, the convergence reduction returns the local flag, and
/// any attempt to reach another rank is a configuration error.
#[derive(Debug, Default)]
pub struct SerialComm<T> {
    inbox: HashMap<usize, VecDeque<Vec<T>>>,
}

impl<T> SerialComm<T> {
    pub fn new() -> Self {
        Self {
            inbox: HashMap::new(),
        }
    }
}

impl<T: Scalar> Communicator<T> for SerialComm<T> {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn send(&mut self, data: &[T], dest: usize, tag: usize) -> Result<(), SdcError> {
        if dest != 0 {
            return Err(SdcError::Communication {
                rank: dest,
                reason: "no such rank in a serial run".to_string(),
            });
        }
        self.inbox.entry(tag).or_default().push_back(data.to_vec());
        Ok(())
    }

    fn isend(&mut self, data: &[T], dest: usize, tag: usize) -> Result<(), SdcError> {
        self.send(data, dest, tag)
    }

    fn recv(&mut self, data: &mut [T], src: usize, tag: usize) -> Result<(), SdcError> {
        if !self.try_recv(data, src, tag)? {
            return Err(SdcError::Communication {
                rank: src,
                reason: format!("no buffered message with tag {}", tag),
            });
        }
        Ok(())
    }

    fn try_recv(&mut self, data: &mut [T], src: usize, tag: usize) -> Result<bool, SdcError> {
        if src != 0 {
            return Err(SdcError::Communication {
                rank: src,
                reason: "no such rank in a serial run".to_string(),
            });
        }
        let Some(queue) = self.inbox.get_mut(&tag) else {
            return Ok(false);
        };
        let Some(message) = queue.pop_front() else {
            return Ok(false);
        };
        if message.len() != data.len() {
            return Err(SdcError::Communication {
                rank: src,
                reason: format!(
                    "payload length {} does not match buffer length {}",
                    message.len(),
                    data.len()
                ),
            });
        }
        data.copy_from_slice(&message);
        Ok(true)
    }

    fn all_converged(&mut self, local: bool) -> Result<bool, SdcError> {
        Ok(local)
    }

    fn wait_pending(&mut self) -> Result<(), SdcError> {
        Ok(())
    }

    fn drain(&mut self) {
        self.inbox.clear();
    }
}
