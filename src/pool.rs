//! Round-robin allocation of MIDI channels to notes.
//!
//! A pitch bend applies to a whole channel, so notes that are bent independently of each other
//! must sound on different channels. The pool hands out the 15 melodic channels in turn, leaving
//! out the channel that General MIDI reserves for percussion.
//!
//! When writing a file the pool simply wraps around: events in a file are statically ordered, so
//! reusing a channel is harmless. For live output a channel stays leased while its note sounds,
//! and a request that finds every channel leased is refused.

use crate::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Channel index 9 (channel 10 in one-based numbering) is reserved for percussion.
pub const PERCUSSION_CHANNEL: u4 = u4::new(9);

/// Identifies one lease of a channel.
///
/// Releasing with a token whose lease already ended does nothing, so a note that is stopped
/// early may release its channel right away and the timer that would have released it later
/// can fire harmlessly.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ReleaseToken {
    channel: u4,
    generation: u64,
}
impl ReleaseToken {
    #[inline]
    pub fn channel(&self) -> u4 {
        self.channel
    }
}

/// A channel handed out by [`ChannelPool::acquire`](struct.ChannelPool.html#method.acquire).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ChannelLease {
    pub channel: u4,
    pub token: ReleaseToken,
}

/// The set of channels available for independently bent notes.
#[derive(Clone, Debug)]
pub struct ChannelPool {
    channels: Vec<u4>,
    /// Index into `channels` where the next search starts.
    next: usize,
    /// Generation of the live lease on each channel, indexed by channel number.
    leases: [Option<u64>; 16],
    generation: u64,
}
impl Default for ChannelPool {
    fn default() -> ChannelPool {
        ChannelPool::new()
    }
}
impl ChannelPool {
    /// A pool of every channel except the percussion channel, in ascending order.
    pub fn new() -> ChannelPool {
        ChannelPool {
            channels: (0..16)
                .map(u4::new)
                .filter(|&ch| ch != PERCUSSION_CHANNEL)
                .collect(),
            next: 0,
            leases: [None; 16],
            generation: 0,
        }
    }

    /// The pooled channels, in round-robin order.
    #[inline]
    pub fn channels(&self) -> &[u4] {
        &self.channels
    }

    /// The next channel in round-robin order, regardless of leases.
    ///
    /// This is how channels are assigned when writing a file.
    pub fn next_round_robin(&mut self) -> u4 {
        let channel = self.channels[self.next];
        self.next = (self.next + 1) % self.channels.len();
        channel
    }

    /// Lease the next free channel, or `None` if every channel is leased.
    pub fn acquire(&mut self) -> Option<ChannelLease> {
        let len = self.channels.len();
        for offset in 0..len {
            let idx = (self.next + offset) % len;
            let channel = self.channels[idx];
            let lease = &mut self.leases[channel.as_int() as usize];
            if lease.is_none() {
                self.generation += 1;
                *lease = Some(self.generation);
                self.next = (idx + 1) % len;
                return Some(ChannelLease {
                    channel,
                    token: ReleaseToken {
                        channel,
                        generation: self.generation,
                    },
                });
            }
        }
        warn!("all {} pooled channels are in use, dropping note", len);
        None
    }

    /// End a lease. Returns whether the token still held its channel.
    pub fn release(&mut self, token: ReleaseToken) -> bool {
        let lease = &mut self.leases[token.channel.as_int() as usize];
        if *lease == Some(token.generation) {
            *lease = None;
            true
        } else {
            false
        }
    }

    /// Free every channel and invalidate all outstanding tokens.
    ///
    /// Call this whenever the output device changes.
    pub fn reset(&mut self) {
        self.leases = [None; 16];
        self.next = 0;
        debug!("channel pool reset");
    }

    /// Amount of channels currently leased.
    pub fn in_use(&self) -> usize {
        self.leases.iter().filter(|lease| lease.is_some()).count()
    }
}

/// A [`ChannelPool`](struct.ChannelPool.html) that can be shared between the thread starting
/// notes and the timers ending them.
#[derive(Clone, Debug, Default)]
pub struct SharedChannelPool {
    inner: Arc<Mutex<ChannelPool>>,
}
impl SharedChannelPool {
    pub fn new() -> SharedChannelPool {
        SharedChannelPool::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelPool> {
        //Every pool method leaves the pool consistent, even when poisoned
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn acquire(&self) -> Option<ChannelLease> {
        self.lock().acquire()
    }

    pub fn release(&self, token: ReleaseToken) -> bool {
        self.lock().release(token)
    }

    pub fn reset(&self) {
        self.lock().reset()
    }

    pub fn in_use(&self) -> usize {
        self.lock().in_use()
    }
}
