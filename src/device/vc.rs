//! Virtual channel classification.
//!
//! Every outgoing request rides one request VC. The classifier picks it from
//! the traffic class and transfer kind, validates explicit requests against
//! the allowed subsets, and keeps data and flow-control traffic apart.
//!
//! # VC Map
//!
//! | VC | Use |
//! |----|-----|
//! | 0 | DRAM reads and writes |
//! | 1 | L1 / Ethernet writes |
//! | 2 | L1 / Ethernet reads |
//! | 3 | Flow control (semaphores, credits) |
//! | 4 | Multicast writes (reserved) |
//! | 5+ | Responses and acks (hardware only) |

use std::fmt;

use super::noc_spec::{MULTICAST_VC, NUM_UNICAST_VCS};
use crate::error::{NocError, Result};

/// Bandwidth class of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    /// Traffic to or from a DRAM bank.
    Dram,
    /// Traffic to or from core L1 or an Ethernet endpoint.
    L1OrEthernet,
    /// Semaphores, credits and other small control messages.
    FlowControl,
}

impl TrafficClass {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TrafficClass::Dram => "dram",
            TrafficClass::L1OrEthernet => "l1/ethernet",
            TrafficClass::FlowControl => "flow-control",
        }
    }
}

/// Direction and fan-out of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransferKind {
    /// Unicast read.
    Read,
    /// Unicast write.
    Write,
    /// Write to a rectangle of cores.
    MulticastWrite,
}

impl TransferKind {
    /// All kinds, for iterating counters.
    pub const ALL: [TransferKind; 3] = [TransferKind::Read, TransferKind::Write, TransferKind::MulticastWrite];

    /// Whether this kind fans out to several destinations.
    pub fn is_multicast(&self) -> bool {
        matches!(self, TransferKind::MulticastWrite)
    }

    /// Whether this kind moves data away from the issuing core.
    pub fn is_write(&self) -> bool {
        !matches!(self, TransferKind::Read)
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Read => write!(f, "read"),
            TransferKind::Write => write!(f, "write"),
            TransferKind::MulticastWrite => write!(f, "mcast-write"),
        }
    }
}

/// A validated request VC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualChannel(u8);

impl VirtualChannel {
    /// The reserved multicast VC.
    pub const MULTICAST: VirtualChannel = VirtualChannel(MULTICAST_VC);

    /// Validate a VC for a transfer kind.
    pub fn for_kind(vc: u8, kind: TransferKind) -> Result<Self> {
        if kind.is_multicast() {
            if vc != MULTICAST_VC {
                return Err(NocError::UnsupportedVc { vc, kind: "multicast" });
            }
        } else if vc >= NUM_UNICAST_VCS {
            return Err(NocError::UnsupportedVc { vc, kind: "unicast" });
        }
        Ok(Self(vc))
    }

    /// Numeric VC id.
    pub fn id(&self) -> u8 {
        self.0
    }

    /// Whether this is the multicast VC.
    pub fn is_multicast(&self) -> bool {
        self.0 == MULTICAST_VC
    }
}

impl fmt::Display for VirtualChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vc{}", self.0)
    }
}

/// Per-VC occupancy: which class is using it and how many transfers.
#[derive(Debug, Clone, Copy)]
struct Occupant {
    class: TrafficClass,
    count: u32,
}

/// Assigns VCs and tracks which class currently owns each unicast VC.
#[derive(Debug, Clone, Default)]
pub struct VcClassifier {
    occupancy: [Option<Occupant>; NUM_UNICAST_VCS as usize],
}

impl VcClassifier {
    /// Create an empty classifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default VC for a class and kind.
    pub fn default_vc(class: TrafficClass, kind: TransferKind) -> VirtualChannel {
        if kind.is_multicast() {
            return VirtualChannel::MULTICAST;
        }
        let vc = match (class, kind) {
            (TrafficClass::Dram, _) => 0,
            (TrafficClass::L1OrEthernet, TransferKind::Read) => 2,
            (TrafficClass::L1OrEthernet, _) => 1,
            (TrafficClass::FlowControl, _) => 3,
        };
        VirtualChannel(vc)
    }

    /// Pick the VC for a transfer.
    ///
    /// `requested` overrides the default but must fall in the allowed subset
    /// and must not put a second class onto a VC that is in use.
    pub fn classify(
        &self,
        class: TrafficClass,
        kind: TransferKind,
        requested: Option<u8>,
    ) -> Result<VirtualChannel> {
        let vc = match requested {
            Some(vc) => VirtualChannel::for_kind(vc, kind)?,
            None => Self::default_vc(class, kind),
        };

        if vc.is_multicast() {
            return Ok(vc);
        }

        if let Some(occupant) = self.occupancy[vc.0 as usize] {
            if occupant.class != class {
                return Err(NocError::VcClassConflict {
                    vc: vc.0,
                    active: occupant.class.name(),
                    requested: class.name(),
                });
            }
        }

        Ok(vc)
    }

    /// Record a transfer of `class` starting on `vc`.
    pub fn occupy(&mut self, vc: VirtualChannel, class: TrafficClass) {
        if vc.is_multicast() {
            return;
        }
        let idx = vc.0 as usize;
        if let Some(occupant) = self.occupancy[idx].as_mut() {
            if occupant.class != class {
                // Unreachable through classify(); keep the first owner.
                log::warn!("{} occupied by {} while {} was added", vc, occupant.class.name(), class.name());
            }
            occupant.count += 1;
            return;
        }
        self.occupancy[idx] = Some(Occupant { class, count: 1 });
    }

    /// Record a transfer on `vc` finishing.
    pub fn vacate(&mut self, vc: VirtualChannel) {
        if vc.is_multicast() {
            return;
        }
        let idx = vc.0 as usize;
        let emptied = match self.occupancy[idx].as_mut() {
            Some(occupant) => {
                occupant.count = occupant.count.saturating_sub(1);
                occupant.count == 0
            }
            None => false,
        };
        if emptied {
            self.occupancy[idx] = None;
        }
    }

    /// Class currently using a VC, if any.
    pub fn occupant(&self, vc: VirtualChannel) -> Option<TrafficClass> {
        if vc.is_multicast() {
            return None;
        }
        self.occupancy[vc.0 as usize].map(|o| o.class)
    }

    /// Number of unicast VCs with traffic in flight.
    pub fn active_count(&self) -> usize {
        self.occupancy.iter().filter(|o| o.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_separates_classes() {
        let dram = VcClassifier::default_vc(TrafficClass::Dram, TransferKind::Write);
        let l1 = VcClassifier::default_vc(TrafficClass::L1OrEthernet, TransferKind::Write);
        let fc = VcClassifier::default_vc(TrafficClass::FlowControl, TransferKind::Write);
        assert_ne!(dram, l1);
        assert_ne!(dram, fc);
        assert_ne!(l1, fc);
        assert_eq!(VcClassifier::default_vc(TrafficClass::L1OrEthernet, TransferKind::Read).id(), 2);
    }

    #[test]
    fn test_multicast_forced_to_reserved_vc() {
        let c = VcClassifier::new();
        for class in [TrafficClass::Dram, TrafficClass::L1OrEthernet, TrafficClass::FlowControl] {
            let vc = c.classify(class, TransferKind::MulticastWrite, None).unwrap();
            assert_eq!(vc, VirtualChannel::MULTICAST);
        }
        assert!(c.classify(TrafficClass::L1OrEthernet, TransferKind::MulticastWrite, Some(4)).is_ok());
        assert!(matches!(
            c.classify(TrafficClass::L1OrEthernet, TransferKind::MulticastWrite, Some(1)),
            Err(NocError::UnsupportedVc { vc: 1, .. })
        ));
    }

    #[test]
    fn test_unicast_rejects_out_of_subset() {
        let c = VcClassifier::new();
        assert!(matches!(
            c.classify(TrafficClass::L1OrEthernet, TransferKind::Write, Some(5)),
            Err(NocError::UnsupportedVc { vc: 5, kind: "unicast" })
        ));
        assert!(matches!(
            c.classify(TrafficClass::L1OrEthernet, TransferKind::Write, Some(MULTICAST_VC)),
            Err(NocError::UnsupportedVc { vc: 4, kind: "unicast" })
        ));
        for vc in 0..NUM_UNICAST_VCS {
            assert!(c.classify(TrafficClass::Dram, TransferKind::Read, Some(vc)).is_ok());
        }
    }

    #[test]
    fn test_class_conflict_while_active() {
        let mut c = VcClassifier::new();
        let vc = c.classify(TrafficClass::Dram, TransferKind::Write, None).unwrap();
        c.occupy(vc, TrafficClass::Dram);

        // L1 traffic may not join the DRAM VC while it is busy
        assert!(matches!(
            c.classify(TrafficClass::L1OrEthernet, TransferKind::Write, Some(vc.id())),
            Err(NocError::VcClassConflict { vc: 0, .. })
        ));
        // Flow control neither
        assert!(c.classify(TrafficClass::FlowControl, TransferKind::Write, Some(0)).is_err());
        // More DRAM is fine
        assert!(c.classify(TrafficClass::Dram, TransferKind::Read, Some(0)).is_ok());

        c.vacate(vc);
        assert_eq!(c.occupant(vc), None);
        assert!(c.classify(TrafficClass::L1OrEthernet, TransferKind::Write, Some(0)).is_ok());
    }

    #[test]
    fn test_occupancy_counts() {
        let mut c = VcClassifier::new();
        let vc = VirtualChannel::for_kind(1, TransferKind::Write).unwrap();
        c.occupy(vc, TrafficClass::L1OrEthernet);
        c.occupy(vc, TrafficClass::L1OrEthernet);
        assert_eq!(c.active_count(), 1);
        c.vacate(vc);
        assert_eq!(c.occupant(vc), Some(TrafficClass::L1OrEthernet));
        c.vacate(vc);
        assert_eq!(c.active_count(), 0);
    }
}
