use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};

use super::Communicator;
use crate::{errors::SdcError, Scalar};

struct Message<T> {
    src: usize,
    tag: usize,
    data: Vec<T>,
}

struct ReduceState {
    count: usize,
    all: bool,
    result: bool,
    generation: u64,
}

struct Reduce {
    state: Mutex<ReduceState>,
    cv: Condvar,
    num_ranks: usize,
}

/// In-process transport: every rank runs on its own thread and exchanges
/// state payloads over `std::sync::mpsc` channels. Messages are matched by
/// (source, tag) with a reorder buffer, the convergence reduction is a
/// generation-counted barrier. This is the deterministic transport used by
/// the time-parallel tests; an MPI transport implements the same trait.
pub struct ChannelComm<T> {
    rank: usize,
    peers: Vec<Sender<Message<T>>>,
    inbox: Receiver<Message<T>>,
    buffered: HashMap<(usize, usize), VecDeque<Vec<T>>>,
    reduce: Arc<Reduce>,
}

impl<T: Scalar + Send + 'static> ChannelComm<T> {
    /// Create a fully connected set of communicators, one per rank.
    pub fn connected(num_ranks: usize) -> Vec<Self> {
        let mut senders = Vec::with_capacity(num_ranks);
        let mut receivers = Vec::with_capacity(num_ranks);
        for _ in 0..num_ranks {
            let (tx, rx) = channel();
            senders.push(tx);
            receivers.push(rx);
        }
        let reduce = Arc::new(Reduce {
            state: Mutex::new(ReduceState {
                count: 0,
                all: true,
                result: false,
                generation: 0,
            }),
            cv: Condvar::new(),
            num_ranks,
        });

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: senders.clone(),
                inbox,
                buffered: HashMap::new(),
                reduce: Arc::clone(&reduce),
            })
            .collect()
    }

    fn buffer(&mut self, message: Message<T>) {
        self.buffered
            .entry((message.src, message.tag))
            .or_default()
            .push_back(message.data);
    }

    fn take_buffered(&mut self, src: usize, tag: usize) -> Option<Vec<T>> {
        self.buffered.get_mut(&(src, tag))?.pop_front()
    }

    fn deliver(message: Vec<T>, data: &mut [T], src: usize) -> Result<(), SdcError> {
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
        Ok(())
    }
}

impl<T: Scalar + Send + 'static> Communicator<T> for ChannelComm<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.peers.len()
    }

    fn send(&mut self, data: &[T], dest: usize, tag: usize) -> Result<(), SdcError> {
        if dest >= self.peers.len() {
            return Err(SdcError::Communication {
                rank: dest,
                reason: "destination rank out of range".to_string(),
            });
        }
        self.peers[dest]
            .send(Message {
                src: self.rank,
                tag,
                data: data.to_vec(),
            })
            .map_err(|_| SdcError::Communication {
                rank: dest,
                reason: "receiving rank has shut down".to_string(),
            })
    }

    fn isend(&mut self, data: &[T], dest: usize, tag: usize) -> Result<(), SdcError> {
        // channel sends never block and copy the payload, so the buffer is
        // immediately reusable
        self.send(data, dest, tag)
    }

    fn recv(&mut self, data: &mut [T], src: usize, tag: usize) -> Result<(), SdcError> {
        loop {
            if let Some(message) = self.take_buffered(src, tag) {
                return Self::deliver(message, data, src);
            }
            let message = self.inbox.recv().map_err(|_| SdcError::Communication {
                rank: src,
                reason: "all sending ranks have shut down".to_string(),
            })?;
            self.buffer(message);
        }
    }

    fn try_recv(&mut self, data: &mut [T], src: usize, tag: usize) -> Result<bool, SdcError> {
        while let Ok(message) = self.inbox.try_recv() {
            self.buffer(message);
        }
        match self.take_buffered(src, tag) {
            Some(message) => {
                Self::deliver(message, data, src)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn all_converged(&mut self, local: bool) -> Result<bool, SdcError> {
        let mut state = self.reduce.state.lock().map_err(|_| SdcError::Communication {
            rank: self.rank,
            reason: "reduction state poisoned".to_string(),
        })?;
        state.all &= local;
        state.count += 1;
        if state.count == self.reduce.num_ranks {
            state.result = state.all;
            state.count = 0;
            state.all = true;
            state.generation += 1;
            self.reduce.cv.notify_all();
            return Ok(state.result);
        }
        let generation = state.generation;
        while state.generation == generation {
            state = self
                .reduce
                .cv
                .wait(state)
                .map_err(|_| SdcError::Communication {
                    rank: self.rank,
                    reason: "reduction state poisoned".to_string(),
                })?;
        }
        Ok(state.result)
    }

    fn wait_pending(&mut self) -> Result<(), SdcError> {
        // payloads are copied on send, nothing to wait for
        Ok(())
    }

    fn drain(&mut self) {
        while self.inbox.try_recv().is_ok() {}
        self.buffered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairwise_exchange_out_of_order() {
        let mut comms = ChannelComm::<f64>::connected(2);
        let mut right = comms.pop().unwrap();
        let mut left = comms.pop().unwrap();

        left.send(&[1.0], 1, 10).unwrap();
        left.send(&[2.0], 1, 11).unwrap();

        // tags are matched independently of arrival order
        let mut buf = [0.0];
        right.recv(&mut buf, 0, 11).unwrap();
        assert_eq!(buf, [2.0]);
        right.recv(&mut buf, 0, 10).unwrap();
        assert_eq!(buf, [1.0]);

        assert!(!right.try_recv(&mut buf, 0, 10).unwrap());
    }

    #[test]
    fn test_reduction_requires_all_ranks() {
        let comms = ChannelComm::<f64>::connected(3);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|mut comm| {
                std::thread::spawn(move || {
                    let first = comm.all_converged(comm.rank() != 1).unwrap();
                    let second = comm.all_converged(true).unwrap();
                    (first, second)
                })
            })
            .collect();
        for handle in handles {
            let (first, second) = handle.join().unwrap();
            assert!(!first);
            assert!(second);
        }
    }
}
