//! Membership ring construction and neighbor lookup.

mod place;

pub use place::hash_key;

use std::net::SocketAddr;

use crate::utils::RingKvError;

use serde::{Deserialize, Serialize};

/// One live member placed on the ring: an address plus its hash position.
/// Immutable once placed into a ring snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingMember {
    /// Member address.
    pub addr: SocketAddr,

    /// Hash position on the ring, in `[0, ring_space)`.
    pub pos: u64,
}

impl RingMember {
    /// Places an address onto the ring by hashing its string form.
    pub fn new(addr: SocketAddr, ring_space: u64) -> Self {
        RingMember {
            addr,
            pos: hash_key(&addr.to_string(), ring_space),
        }
    }
}

// equality is by address; the position is derived from it
impl PartialEq for RingMember {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for RingMember {}

/// Hash-ordered ring of live members. Rebuilt wholesale from every
/// membership snapshot; no incremental patching.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ring {
    /// Members sorted ascending by hash position.
    members: Vec<RingMember>,

    /// Size of the hash coordinate space the members were placed in.
    space: u64,
}

impl Ring {
    /// Builds a ring from a membership snapshot by hashing every address
    /// and sorting ascending by position (position ties broken by address
    /// for a deterministic order).
    pub fn build(snapshot: &[SocketAddr], ring_space: u64) -> Ring {
        let mut members: Vec<RingMember> = snapshot
            .iter()
            .map(|&addr| RingMember::new(addr, ring_space))
            .collect();
        members.sort_by_key(|m| (m.pos, m.addr));
        Ring {
            members,
            space: ring_space,
        }
    }

    /// Assembles a ring from explicit members, assumed position-sorted.
    pub(crate) fn from_members(members: Vec<RingMember>, space: u64) -> Ring {
        Ring { members, space }
    }

    /// Number of live members on the ring.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in ascending position order.
    pub fn members(&self) -> &[RingMember] {
        &self.members
    }

    /// Index of the given address on the ring, if present.
    pub fn position_of(&self, addr: SocketAddr) -> Option<usize> {
        self.members.iter().position(|m| m.addr == addr)
    }

    /// The two ring successors of the given address, i.e. the members at
    /// the next two positions with wrap-around. Fails when the address is
    /// not on the ring or the ring holds fewer than 3 members.
    pub fn successors_of(
        &self,
        addr: SocketAddr,
    ) -> Result<(RingMember, RingMember), RingKvError> {
        if self.members.len() < 3 {
            return logged_err!(
                "ring of {} members has no successor pair",
                self.members.len()
            );
        }
        match self.position_of(addr) {
            Some(idx) => {
                let n = self.members.len();
                Ok((
                    self.members[(idx + 1) % n].clone(),
                    self.members[(idx + 2) % n].clone(),
                ))
            }
            None => logged_err!("address {} not on the ring", addr),
        }
    }
}

#[cfg(test)]
mod ring_tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn build_sorts_by_position() {
        let snapshot: Vec<SocketAddr> =
            (1..=7).map(|p| addr(7000 + p)).collect();
        let ring = Ring::build(&snapshot, 512);
        assert_eq!(ring.len(), 7);
        for pair in ring.members().windows(2) {
            assert!(pair[0].pos <= pair[1].pos);
        }
    }

    #[test]
    fn member_equality_by_address() {
        let ma = RingMember {
            addr: addr(7001),
            pos: 10,
        };
        let mb = RingMember {
            addr: addr(7001),
            pos: 99,
        };
        let mc = RingMember {
            addr: addr(7002),
            pos: 10,
        };
        assert_eq!(ma, mb);
        assert_ne!(ma, mc);
    }

    #[test]
    fn position_of_covers_head_slot() {
        let snapshot: Vec<SocketAddr> =
            (1..=5).map(|p| addr(7000 + p)).collect();
        let ring = Ring::build(&snapshot, 512);
        let head = ring.members()[0].addr;
        assert_eq!(ring.position_of(head), Some(0));
        assert_eq!(ring.position_of(addr(9999)), None);
    }

    #[test]
    fn successors_wrap_around() -> Result<(), RingKvError> {
        let members = vec![
            RingMember {
                addr: addr(1),
                pos: 10,
            },
            RingMember {
                addr: addr(2),
                pos: 40,
            },
            RingMember {
                addr: addr(3),
                pos: 70,
            },
        ];
        let ring = Ring::from_members(members, 512);
        let (s1, s2) = ring.successors_of(addr(3))?;
        assert_eq!(s1.addr, addr(1));
        assert_eq!(s2.addr, addr(2));
        Ok(())
    }

    #[test]
    fn successors_need_three_members() {
        let members = vec![
            RingMember {
                addr: addr(1),
                pos: 10,
            },
            RingMember {
                addr: addr(2),
                pos: 40,
            },
        ];
        let ring = Ring::from_members(members, 512);
        assert!(ring.successors_of(addr(1)).is_err());
    }
}
