use num_traits::Zero;

use super::{split_pair, ControllerConfig, RunStats};
use crate::{
    comm::{tag_for, Communicator},
    encap::Encapsulation,
    errors::SdcError,
    sweeper::Sweeper,
    transfer::Transfer,
    Scalar,
};

const BLOCK_TAG: usize = 900;

/// Pipelined parallel-in-time controller. Each rank owns one step of every
/// block and runs one V-cycle per iteration, exchanging start states with its
/// neighbours: non-blocking end-state sends on the way down, a blocking
/// receive on the coarsest level, opportunistic receives on the way up.
pub struct Pfasst<T, S, Tr, C>
where
    T: Scalar,
    S: Sweeper<T>,
    Tr: Transfer<T, S>,
    C: Communicator<T>,
{
    levels: Vec<S>,
    transfers: Vec<Tr>,
    nsweeps: Vec<usize>,
    config: ControllerConfig,
    comm: C,
    stats: RunStats,
    _marker: std::marker::PhantomData<T>,
}

impl<T, S, Tr, C> Pfasst<T, S, Tr, C>
where
    T: Scalar,
    S: Sweeper<T>,
    Tr: Transfer<T, S>,
    C: Communicator<T>,
{
    /// Build from levels ordered coarsest to finest, the transfers coupling
    /// each adjacent pair, and this rank's communicator.
    pub fn new(
        levels: Vec<S>,
        transfers: Vec<Tr>,
        config: ControllerConfig,
        comm: C,
    ) -> Result<Self, SdcError> {
        if levels.is_empty() {
            return Err(SdcError::EmptyHierarchy);
        }
        if transfers.len() + 1 != levels.len() {
            return Err(SdcError::InconsistentHierarchy(format!(
                "{} levels need {} transfers, got {}",
                levels.len(),
                levels.len() - 1,
                transfers.len()
            )));
        }
        let nsweeps = vec![1; levels.len()];
        Ok(Self {
            levels,
            transfers,
            nsweeps,
            config,
            comm,
            stats: RunStats::default(),
            _marker: std::marker::PhantomData,
        })
    }

    pub fn set_nsweeps(&mut self, nsweeps: Vec<usize>) -> Result<(), SdcError> {
        if nsweeps.len() != self.levels.len() {
            return Err(SdcError::InconsistentHierarchy(
                "one sweep count per level required".to_string(),
            ));
        }
        self.nsweeps = nsweeps;
        Ok(())
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn finest(&self) -> &S {
        self.levels.last().expect("hierarchy is never empty")
    }

    fn sweep_level(&mut self, level: usize) {
        for _ in 0..self.nsweeps[level] {
            self.levels[level].sweep();
        }
    }

    fn send_end_state(&mut self, level: usize, tag: usize, blocking: bool) -> Result<(), SdcError> {
        let rank = self.comm.rank();
        if rank + 1 >= self.comm.num_ranks() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(self.levels[level].end_state().len());
        self.levels[level].end_state().pack(&mut buf);
        if blocking {
            self.comm.send(&buf, rank + 1, tag)
        } else {
            self.comm.isend(&buf, rank + 1, tag)
        }
    }

    fn recv_start_state(&mut self, level: usize, tag: usize) -> Result<(), SdcError> {
        let rank = self.comm.rank();
        let mut buf = vec![T::zero(); self.levels[level].start_state().len()];
        self.comm.recv(&mut buf, rank - 1, tag)?;
        self.levels[level].start_state_mut().unpack(&buf);
        Ok(())
    }

    fn try_recv_start_state(&mut self, level: usize, tag: usize) -> Result<bool, SdcError> {
        let rank = self.comm.rank();
        let mut buf = vec![T::zero(); self.levels[level].start_state().len()];
        if self.comm.try_recv(&mut buf, rank - 1, tag)? {
            self.levels[level].start_state_mut().unpack(&buf);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Pipelined predictor: restrict the start state to the coarsest level,
    /// sweep there with a staircase of receives so that rank p ends up with
    /// p + 1 coarse sweeps, then interpolate the result back up.
    fn predictor(&mut self, first_step: bool) -> Result<(), SdcError> {
        let rank = self.comm.rank();
        let num_levels = self.levels.len();

        // corrections from the previous step do not apply to this one
        for level in self.levels.iter_mut() {
            level.clear_tau();
        }
        for fine_index in (1..num_levels).rev() {
            let (coarse, fine) = split_pair(&mut self.levels, fine_index);
            self.transfers[fine_index - 1].restrict_initial(coarse, fine);
        }

        self.levels[0].predict(first_step);
        self.send_end_state(0, tag_for(0, 1), false)?;
        for j in 1..=rank {
            self.recv_start_state(0, tag_for(0, j))?;
            self.sweep_level(0);
            self.send_end_state(0, tag_for(0, j + 1), false)?;
        }

        for fine_index in 1..num_levels {
            // provisional fine solution, then the coarse correction on top
            self.levels[fine_index].predict(first_step);
            let (coarse, fine) = split_pair(&mut self.levels, fine_index);
            self.transfers[fine_index - 1].interpolate(fine, coarse, true);
        }
        Ok(())
    }

    /// One parallel V-cycle; returns true when all ranks are done.
    fn iteration(&mut self, iteration: usize) -> Result<bool, SdcError> {
        let rank = self.comm.rank();
        let num_levels = self.levels.len();
        let finest = num_levels - 1;
        let dt = self.config.dt::<T>();
        let last_iteration = iteration == self.config.num_iter;

        if num_levels == 1 {
            // pipelined single-level iteration
            if rank > 0 {
                self.recv_start_state(0, tag_for(0, iteration))?;
            }
            self.sweep_level(0);
            self.stats.total_iterations += 1;
            let residual = self.levels[0].residual_norm(dt);
            self.stats.final_residual = residual.to_f64();
            self.send_end_state(0, tag_for(0, iteration), false)?;
            let local = self.levels[0].converged() || last_iteration;
            return self.comm.all_converged(local);
        }

        // sweep the finest level and pass its end state forward
        self.sweep_level(finest);
        self.stats.total_iterations += 1;
        let residual = self.levels[finest].residual_norm(dt);
        self.stats.final_residual = residual.to_f64();
        tracing::info!(
            rank,
            iteration,
            residual = residual.to_f64(),
            "finished fine sweep"
        );
        self.send_end_state(finest, tag_for(finest, iteration), false)?;

        let local = self.levels[finest].converged() || last_iteration;
        if self.comm.all_converged(local)? {
            return Ok(true);
        }

        // down leg
        for fine_index in (1..num_levels).rev() {
            if fine_index != finest {
                self.sweep_level(fine_index);
                self.send_end_state(fine_index, tag_for(fine_index, iteration), false)?;
            }
            let (coarse, fine) = split_pair(&mut self.levels, fine_index);
            self.transfers[fine_index - 1].restrict(coarse, fine, rank == 0);
            self.transfers[fine_index - 1].fas(dt, coarse, fine);
        }

        // coarsest level, tightly coupled to the left neighbour
        if rank > 0 {
            self.recv_start_state(0, tag_for(0, iteration))?;
        }
        self.sweep_level(0);
        self.send_end_state(0, tag_for(0, iteration), false)?;

        // up leg
        for fine_index in 1..num_levels {
            let mut new_start = false;
            if rank > 0 {
                new_start = self.try_recv_start_state(fine_index, tag_for(fine_index, iteration))?;
            }
            let (coarse, fine) = split_pair(&mut self.levels, fine_index);
            self.transfers[fine_index - 1].interpolate(fine, coarse, new_start || rank > 0);
            if fine_index != finest {
                self.sweep_level(fine_index);
            }
        }

        Ok(false)
    }

    /// Integrate all blocks; every rank returns the end state of its own
    /// step of the final block.
    pub fn run(&mut self, u0: &S::Encap) -> Result<S::Encap, SdcError> {
        self.config.validate()?;
        let rank = self.comm.rank();
        let num_ranks = self.comm.num_ranks();
        let num_levels = self.levels.len();
        if self.config.num_steps % num_ranks != 0 {
            return Err(SdcError::StepsNotDivisible {
                num_steps: self.config.num_steps,
                num_ranks,
            });
        }
        for (index, level) in self.levels.iter_mut().enumerate() {
            level.setup(index + 1 != num_levels)?;
        }

        if u0.len() != self.levels[num_levels - 1].start_state().len() {
            return Err(SdcError::EncapSizeMismatch {
                expected: self.levels[num_levels - 1].start_state().len(),
                got: u0.len(),
            });
        }

        let dt = self.config.dt::<T>();
        let num_blocks = self.config.num_steps / num_ranks;
        self.levels[num_levels - 1].set_start_state(u0);
        self.stats = RunStats::default();

        for block in 0..num_blocks {
            let step = block * num_ranks + rank;
            let t = self.config.step_time::<T>(step);
            for level in self.levels.iter_mut() {
                level.set_step(t, dt);
            }
            tracing::info!(rank, block, step, "starting block");

            self.predictor(step == 0)?;

            for iteration in 1..=self.config.num_iter {
                if self.iteration(iteration)? {
                    self.levels[num_levels - 1].mark_converged();
                    break;
                }
            }

            // drop whatever the early exit left in flight
            self.comm.wait_pending()?;
            self.comm.drain();
            self.stats.num_steps += 1;

            if block + 1 < num_blocks {
                // every rank has drained before anyone may send into the
                // next block
                self.comm.all_converged(true)?;

                // the last rank's end state wraps around to rank 0 as the
                // start of the next block
                if rank == num_ranks - 1 && num_ranks > 1 {
                    let mut buf = Vec::new();
                    self.levels[num_levels - 1].end_state().pack(&mut buf);
                    self.comm.send(&buf, 0, BLOCK_TAG + block % 16)?;
                }
                for level in self.levels.iter_mut() {
                    level.advance();
                }
                if rank == 0 && num_ranks > 1 {
                    let finest = num_levels - 1;
                    let mut buf = vec![T::zero(); self.levels[finest].start_state().len()];
                    self.comm
                        .recv(&mut buf, num_ranks - 1, BLOCK_TAG + block % 16)?;
                    self.levels[finest].start_state_mut().unpack(&buf);
                }
            }
        }

        Ok(self.levels[num_levels - 1].end_state().clone())
    }
}
