//! Command slots and cached per-slot state.
//!
//! The NIU accepts commands through a handful of slots. Each slot takes one
//! command every `accept_cycles` cycles; an issue to a busy slot spins.
//!
//! | Slot | Carries |
//! |------|---------|
//! | Read | unicast reads |
//! | Write | unicast writes |
//! | InlineWrite | 4-byte register writes |
//! | Multicast | multicast writes |
//!
//! Stateful issue caches the translated destination, size and VC in a
//! slot so repeated transfers to the same place skip translation.

use std::fmt;

use crate::device::address::NocAddress;
use crate::device::vc::{TrafficClass, TransferKind, VirtualChannel};
use crate::error::{NocError, Result};

/// A hardware command slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSlot {
    /// Unicast reads.
    Read,
    /// Unicast writes.
    Write,
    /// Inline (register) writes.
    InlineWrite,
    /// Multicast writes.
    Multicast,
}

impl CommandSlot {
    /// Every slot.
    pub const ALL: [CommandSlot; 4] = [
        CommandSlot::Read,
        CommandSlot::Write,
        CommandSlot::InlineWrite,
        CommandSlot::Multicast,
    ];

    /// Short name.
    pub fn name(&self) -> &'static str {
        match self {
            CommandSlot::Read => "read",
            CommandSlot::Write => "write",
            CommandSlot::InlineWrite => "inline-write",
            CommandSlot::Multicast => "multicast",
        }
    }

    /// Slot a transfer kind goes through.
    pub fn for_kind(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Read => CommandSlot::Read,
            TransferKind::Write => CommandSlot::Write,
            TransferKind::MulticastWrite => CommandSlot::Multicast,
        }
    }

    /// Transfer kind the slot issues.
    pub fn kind(&self) -> TransferKind {
        match self {
            CommandSlot::Read => TransferKind::Read,
            CommandSlot::Write | CommandSlot::InlineWrite => TransferKind::Write,
            CommandSlot::Multicast => TransferKind::MulticastWrite,
        }
    }

    fn index(&self) -> usize {
        match self {
            CommandSlot::Read => 0,
            CommandSlot::Write => 1,
            CommandSlot::InlineWrite => 2,
            CommandSlot::Multicast => 3,
        }
    }
}

impl fmt::Display for CommandSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Translated transfer parameters cached in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    /// Transfer kind.
    pub kind: TransferKind,
    /// Remote address.
    pub remote: NocAddress,
    /// Payload bytes.
    pub size: u32,
    /// VC.
    pub vc: VirtualChannel,
    /// Traffic class.
    pub class: TrafficClass,
    /// Destinations that will acknowledge.
    pub num_dests: u32,
    /// Sender's own L1 is also written.
    pub loopback: bool,
}

/// Accept timing and cached state for every slot.
#[derive(Debug, Clone)]
pub struct CommandSlots {
    accept_cycles: u32,
    ready_at: [u64; 4],
    accepted: [u64; 4],
    state: [Option<SlotState>; 4],
}

impl CommandSlots {
    /// Slots that accept a command every `accept_cycles` cycles.
    pub fn new(accept_cycles: u32) -> Self {
        Self {
            accept_cycles,
            ready_at: [0; 4],
            accepted: [0; 4],
            state: [None; 4],
        }
    }

    /// Whether `slot` can take a command at cycle `now`.
    pub fn is_ready(&self, slot: CommandSlot, now: u64) -> bool {
        now >= self.ready_at[slot.index()]
    }

    /// First cycle `slot` can take a command.
    pub fn ready_at(&self, slot: CommandSlot) -> u64 {
        self.ready_at[slot.index()]
    }

    /// Hand a command to `slot` at cycle `now`.
    pub fn accept(&mut self, slot: CommandSlot, now: u64) {
        let i = slot.index();
        self.ready_at[i] = now + self.accept_cycles as u64;
        self.accepted[i] += 1;
    }

    /// Commands `slot` has accepted.
    pub fn accepted(&self, slot: CommandSlot) -> u64 {
        self.accepted[slot.index()]
    }

    /// Cache state in `slot`.
    ///
    /// The state's kind must be one the slot carries.
    pub fn set_state(&mut self, slot: CommandSlot, state: SlotState) -> Result<()> {
        if slot.kind() != state.kind {
            return Err(NocError::SlotKindMismatch {
                slot: slot.name(),
                kind: kind_name(state.kind),
            });
        }
        self.state[slot.index()] = Some(state);
        Ok(())
    }

    /// Cached state for `slot`.
    pub fn state(&self, slot: CommandSlot) -> Result<SlotState> {
        self.state[slot.index()].ok_or(NocError::NoSlotState { slot: slot.name() })
    }

    /// Drop cached state.
    pub fn clear_state(&mut self, slot: CommandSlot) {
        self.state[slot.index()] = None;
    }
}

fn kind_name(kind: TransferKind) -> &'static str {
    match kind {
        TransferKind::Read => "read",
        TransferKind::Write => "write",
        TransferKind::MulticastWrite => "multicast-write",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(kind: TransferKind) -> SlotState {
        SlotState {
            kind,
            remote: NocAddress { raw: 0x1000, multicast: kind.is_multicast() },
            size: 64,
            vc: VirtualChannel::for_kind(if kind.is_multicast() { 4 } else { 1 }, kind).unwrap(),
            class: TrafficClass::L1OrEthernet,
            num_dests: 1,
            loopback: false,
        }
    }

    #[test]
    fn test_accept_interval() {
        let mut slots = CommandSlots::new(3);
        assert!(slots.is_ready(CommandSlot::Write, 0));
        slots.accept(CommandSlot::Write, 0);
        assert!(!slots.is_ready(CommandSlot::Write, 2));
        assert!(slots.is_ready(CommandSlot::Write, 3));
        // Slots are independent
        assert!(slots.is_ready(CommandSlot::Read, 0));
        assert_eq!(slots.accepted(CommandSlot::Write), 1);
    }

    #[test]
    fn test_zero_interval_always_ready() {
        let mut slots = CommandSlots::new(0);
        slots.accept(CommandSlot::Read, 5);
        assert!(slots.is_ready(CommandSlot::Read, 5));
    }

    #[test]
    fn test_state_cache() {
        let mut slots = CommandSlots::new(1);
        assert_eq!(slots.state(CommandSlot::Read), Err(NocError::NoSlotState { slot: "read" }));

        slots.set_state(CommandSlot::Read, state(TransferKind::Read)).unwrap();
        assert_eq!(slots.state(CommandSlot::Read).unwrap().size, 64);

        slots.clear_state(CommandSlot::Read);
        assert!(slots.state(CommandSlot::Read).is_err());
    }

    #[test]
    fn test_state_kind_must_match_slot() {
        let mut slots = CommandSlots::new(1);
        assert!(matches!(
            slots.set_state(CommandSlot::Read, state(TransferKind::Write)),
            Err(NocError::SlotKindMismatch { slot: "read", kind: "write" })
        ));
        assert!(slots.set_state(CommandSlot::InlineWrite, state(TransferKind::Write)).is_ok());
        assert!(slots.set_state(CommandSlot::Multicast, state(TransferKind::MulticastWrite)).is_ok());
    }
}
