//! Reference-counted async handles correlating requests with replies.
//!
//! A thread about to issue a command that is answered asynchronously
//! allocates a handle, embeds its token in the command as `request(<token>)`
//! and later waits on the handle. The dispatch loop reads the driver's reply,
//! finds the `reply(<token>)` option, stores the reply in the handle and
//! releases the waiting thread.
//!
//! Handles live in a generation-checked slab. A handle is an
//! `(index, generation)` pair and is only valid while the slot at `index`
//! still carries the same generation, so a stale handle is rejected even
//! after its slot has been reused. Generations come from a counter that only
//! moves forward, which also makes tokens unique.
//!
//! Every slot carries a reference count that starts at one for the
//! allocating caller. [`AsyncHandles::get`] adds a reference and
//! [`AsyncHandles::put`] drops one; the slot is freed by whichever call takes
//! the count to zero. [`AsyncHandles::wait`] holds its own reference while
//! blocked, so a handle with no other holder is freed when its wait returns.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use slab::Slab;
use tracing::trace;

use crate::closure::Closure;
use crate::error::{Error, Result};

/// Identity of an async handle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AsyncHandle {
    index: u32,
    generation: u32,
}

impl AsyncHandle {
    /// Rebuilds a handle from its wire token.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_token(token: u64) -> Self {
        Self {
            index: token as u32,
            generation: (token >> 32) as u32,
        }
    }

    /// The token carried on the wire: generation in the high word, slot
    /// index in the low word.
    #[must_use]
    pub const fn token(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// The `request(<token>)` option naming this handle.
    #[must_use]
    pub fn request_option(self) -> String {
        format!("request({self})")
    }
}

impl fmt::Display for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.token())
    }
}

/// What a waiter takes away once a reply has been delivered.
#[derive(Clone, Debug)]
pub struct Completion {
    /// The reply line stored by the dispatch loop.
    pub reply: String,
    /// The closure attached to the handle at the time of the wake-up.
    pub closure: Option<Closure>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    refs: usize,
    posted: usize,
    reply: Option<String>,
    closure: Option<Closure>,
}

#[derive(Debug)]
struct Table {
    slots: Slab<Slot>,
    next_generation: u32,
}

impl Table {
    fn slot_mut(&mut self, handle: AsyncHandle) -> Result<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(Error::InvalidHandle(handle))
    }

    fn release(&mut self, handle: AsyncHandle) -> Result<()> {
        let slot = self.slot_mut(handle)?;
        slot.refs -= 1;

        if slot.refs == 0 {
            self.slots.remove(handle.index as usize);
            trace!(%handle, "async handle freed");
        }

        Ok(())
    }
}

/// The table of live async handles belonging to one session.
#[derive(Debug)]
pub struct AsyncHandles {
    table: Mutex<Table>,
    delivered: Condvar,
}

impl AsyncHandles {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                slots: Slab::new(),
                next_generation: 1,
            }),
            delivered: Condvar::new(),
        }
    }

    /// Allocates a handle with one reference and an optional closure.
    ///
    /// Generations wrap from `u32::MAX` back to 1, never 0. A handle held
    /// across 2^32 allocations that reuse its slot validates again.
    #[allow(clippy::cast_possible_truncation)]
    pub fn alloc(&self, closure: Option<Closure>) -> AsyncHandle {
        let mut table = self.table.lock();

        let generation = table.next_generation;
        table.next_generation = table.next_generation.checked_add(1).unwrap_or(1);

        let entry = table.slots.vacant_entry();
        let handle = AsyncHandle {
            index: entry.key() as u32,
            generation,
        };
        entry.insert(Slot {
            generation,
            refs: 1,
            posted: 0,
            reply: None,
            closure,
        });

        trace!(%handle, "async handle allocated");
        handle
    }

    /// Takes an extra reference on `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is not live.
    pub fn get(&self, handle: AsyncHandle) -> Result<AsyncHandle> {
        self.table.lock().slot_mut(handle)?.refs += 1;
        Ok(handle)
    }

    /// Drops a reference, freeing the handle when it was the last one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is not live.
    pub fn put(&self, handle: AsyncHandle) -> Result<()> {
        self.table.lock().release(handle)
    }

    /// Swaps the closure attached to `handle`, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is not live.
    pub fn set_closure(
        &self,
        handle: AsyncHandle,
        closure: Option<Closure>,
    ) -> Result<Option<Closure>> {
        let mut table = self.table.lock();
        let slot = table.slot_mut(handle)?;
        Ok(std::mem::replace(&mut slot.closure, closure))
    }

    /// Returns a copy of the closure attached to `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is not live.
    pub fn closure(&self, handle: AsyncHandle) -> Result<Option<Closure>> {
        Ok(self.table.lock().slot_mut(handle)?.closure.clone())
    }

    /// Blocks until a reply is delivered to `handle`.
    ///
    /// The wait holds its own reference while blocked and drops it before
    /// returning, so a handle without other holders is gone afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is not live.
    pub fn wait(&self, handle: AsyncHandle) -> Result<Completion> {
        self.wait_until(handle, None)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the handle is not live and
    /// [`Error::Timeout`] if nothing was delivered in time.
    pub fn wait_timeout(&self, handle: AsyncHandle, timeout: Duration) -> Result<Completion> {
        self.wait_until(handle, Some((Instant::now() + timeout, timeout)))
    }

    fn wait_until(
        &self,
        handle: AsyncHandle,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<Completion> {
        let mut table = self.table.lock();
        table.slot_mut(handle)?.refs += 1;

        loop {
            let slot = table.slot_mut(handle)?;
            if slot.posted > 0 {
                slot.posted -= 1;
                let completion = Completion {
                    reply: slot.reply.clone().unwrap_or_default(),
                    closure: slot.closure.clone(),
                };
                table.release(handle)?;
                return Ok(completion);
            }

            match deadline {
                None => self.delivered.wait(&mut table),
                Some((deadline, timeout)) => {
                    if Instant::now() >= deadline {
                        table.release(handle)?;
                        return Err(Error::Timeout(timeout));
                    }
                    let _ = self.delivered.wait_until(&mut table, deadline);
                }
            }
        }
    }

    /// Stores `reply` in the handle named by `token` and wakes its waiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if the token names no live handle.
    pub fn deliver(&self, token: u64, reply: String) -> Result<()> {
        let handle = AsyncHandle::from_token(token);
        {
            let mut table = self.table.lock();
            let slot = table.slot_mut(handle)?;
            slot.reply = Some(reply);
            slot.posted += 1;
        }

        self.delivered.notify_all();
        Ok(())
    }

    /// Whether `handle` is still live.
    #[must_use]
    pub fn is_live(&self, handle: AsyncHandle) -> bool {
        self.table.lock().slot_mut(handle).is_ok()
    }

    /// Number of live handles.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.table.lock().slots.len()
    }
}

impl Default for AsyncHandles {
    fn default() -> Self {
        Self::new()
    }
}
