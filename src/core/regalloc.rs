//! Virtual-to-physical register assignment.
//!
//! Virtual registers are processed in first-definition order. Each one
//! receives the first candidate from the ABI's priority list (volatile,
//! then argument registers in reverse, then callee-saved) that no
//! interfering register already occupies. Fixed constraints imposed by
//! instruction signatures (shift counts in cl, blend selectors in xmm0)
//! are bound up front; argument loads prefer the register the argument
//! arrived in. When a virtual register cannot be assigned, the allocator
//! names a least-recently-used victim for the caller to spill and retry.

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};

use crate::core::error::{AsmError, AsmResult};
use crate::core::liveness::Analysis;
use crate::x64::registers::RegKey;

/// Candidate physical registers per bank, most-preferred first.
pub type BankOrder = [Vec<u8>; 4];

/// Allocation input beyond the dataflow results.
#[derive(Debug, Default)]
pub struct Constraints {
    /// Signature-imposed physical bindings.
    pub fixed: HashMap<u32, u8>,
    /// Preferred physical register, honored when conflict-free.
    pub preferred: HashMap<u32, u8>,
}

/// Outcome of one allocation attempt.
#[derive(Debug)]
pub enum Outcome {
    /// Every virtual register received a physical index.
    Assigned(HashMap<u32, u8>),
    /// No register was available for `blocked`; spill `victim` and retry.
    Spill { blocked: u32, victim: u32 },
}

fn blocked_set(
    conflicts: Option<&HashSet<RegKey>>,
    assigned: &HashMap<u32, u8>,
) -> HashSet<u8> {
    let mut blocked = HashSet::new();
    let Some(conflicts) = conflicts else {
        return blocked;
    };
    for key in conflicts {
        match key.virt() {
            Some(other) => {
                if let Some(&phys) = assigned.get(&other) {
                    blocked.insert(phys);
                }
            }
            None => {
                blocked.insert(key.code as u8);
            }
        }
    }
    blocked
}

/// Most recent occurrence of `v` at or before `point`.
fn recency(analysis: &Analysis, v: u32, point: usize) -> usize {
    analysis
        .occurrences
        .get(&v)
        .map(|occ| {
            occ.iter()
                .take_while(|&&i| i <= point)
                .last()
                .copied()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Run one allocation attempt over the analysis results.
pub fn allocate(analysis: &Analysis, constraints: &Constraints, order: &BankOrder) -> AsmResult<Outcome> {
    let mut assigned: HashMap<u32, u8> = HashMap::new();

    // fixed bindings first; a conflict here cannot be repaired by choosing
    // a different register
    for (&v, &phys) in &constraints.fixed {
        let blocked = blocked_set(analysis.conflicts.get(&v), &assigned);
        if blocked.contains(&phys) {
            return Err(AsmError::RegisterAllocation {
                reason: format!(
                    "virtual register {v} must be bound to physical register {phys}, which \
                     conflicts with a simultaneously live value"
                ),
            });
        }
        if let Some(&prev) = assigned.get(&v) {
            if prev != phys {
                return Err(AsmError::RegisterAllocation {
                    reason: format!(
                        "virtual register {v} is bound to two different physical registers"
                    ),
                });
            }
        }
        assigned.insert(v, phys);
        trace!("fixed binding: v{v} -> {phys}");
    }

    // remaining virtuals in first-definition order
    let mut queue: Vec<u32> = analysis.first_def.keys().copied().collect();
    queue.sort_by_key(|v| (analysis.first_def[v], *v));

    for v in queue {
        if assigned.contains_key(&v) {
            continue;
        }
        let bank = *analysis.bank_of.get(&v).unwrap_or(&0) as usize;
        let blocked = blocked_set(analysis.conflicts.get(&v), &assigned);

        if let Some(&pref) = constraints.preferred.get(&v) {
            if !blocked.contains(&pref) && order[bank].contains(&pref) {
                assigned.insert(v, pref);
                trace!("v{v} -> preferred {pref}");
                continue;
            }
        }

        match order[bank].iter().find(|&&c| !blocked.contains(&c)) {
            Some(&phys) => {
                trace!("v{v} -> {phys}");
                assigned.insert(v, phys);
            }
            None => {
                // every candidate is occupied: name the least-recently-used
                // interfering virtual as the spill victim
                let point = analysis.first_def[&v];
                let victim = analysis
                    .conflicts
                    .get(&v)
                    .into_iter()
                    .flatten()
                    .filter_map(RegKey::virt)
                    .filter(|other| assigned.contains_key(other))
                    .min_by_key(|&other| (recency(analysis, other, point), other));
                match victim {
                    Some(victim) => {
                        debug!("register pressure at v{v}: spilling v{victim}");
                        return Ok(Outcome::Spill { blocked: v, victim });
                    }
                    None => {
                        return Err(AsmError::RegisterAllocation {
                            reason: format!(
                                "no physical register available for virtual register {v} \
                                 and no spill candidate exists"
                            ),
                        });
                    }
                }
            }
        }
    }

    debug!("allocated {} virtual registers", assigned.len());
    Ok(Outcome::Assigned(assigned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::liveness::{analyze, FlowKind, InstEffects};
    use crate::x64::registers::RegKey;

    fn virt(v: u32) -> RegKey {
        RegKey {
            bank: 0,
            code: -(v as i64) - 1,
        }
    }

    fn phys(code: i64) -> RegKey {
        RegKey { bank: 0, code }
    }

    fn eff(uses: Vec<RegKey>, defs: Vec<RegKey>) -> InstEffects {
        InstEffects {
            uses,
            defs,
            flow: FlowKind::Fall,
        }
    }

    fn stop(uses: Vec<RegKey>) -> InstEffects {
        InstEffects {
            uses,
            defs: vec![],
            flow: FlowKind::Stop,
        }
    }

    fn order_0_to_3() -> BankOrder {
        [vec![0, 1, 2, 3], vec![], vec![], vec![]]
    }

    #[test]
    fn interfering_virtuals_get_distinct_registers() {
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            eff(vec![], vec![virt(1)]),
            stop(vec![virt(0), virt(1)]),
        ];
        let a = analyze(&effects, &[]).unwrap();
        let out = allocate(&a, &Constraints::default(), &order_0_to_3()).unwrap();
        let Outcome::Assigned(map) = out else {
            panic!("expected assignment")
        };
        assert_ne!(map[&0], map[&1]);
        assert_eq!(map[&0], 0);
        assert_eq!(map[&1], 1);
    }

    #[test]
    fn non_interfering_virtuals_share() {
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            stop(vec![virt(0)]),
        ];
        let mut effects2 = effects.clone();
        effects2[1] = eff(vec![virt(0)], vec![]);
        effects2.push(eff(vec![], vec![virt(1)]));
        effects2.push(stop(vec![virt(1)]));
        let a = analyze(&effects2, &[]).unwrap();
        let Outcome::Assigned(map) =
            allocate(&a, &Constraints::default(), &order_0_to_3()).unwrap()
        else {
            panic!()
        };
        assert_eq!(map[&0], 0);
        assert_eq!(map[&1], 0);
    }

    #[test]
    fn live_physical_register_steers_assignment() {
        // rax (phys 0) written while v0 is live: v0 avoids it
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            eff(vec![], vec![phys(0)]),
            stop(vec![virt(0), phys(0)]),
        ];
        let a = analyze(&effects, &[]).unwrap();
        let Outcome::Assigned(map) =
            allocate(&a, &Constraints::default(), &order_0_to_3()).unwrap()
        else {
            panic!()
        };
        assert_eq!(map[&0], 1);
    }

    #[test]
    fn fixed_binding_honored() {
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            eff(vec![], vec![virt(1)]),
            stop(vec![virt(0), virt(1)]),
        ];
        let a = analyze(&effects, &[]).unwrap();
        let mut constraints = Constraints::default();
        constraints.fixed.insert(1, 1); // v1 must live in cl
        let Outcome::Assigned(map) = allocate(&a, &constraints, &order_0_to_3()).unwrap()
        else {
            panic!()
        };
        assert_eq!(map[&1], 1);
        assert_eq!(map[&0], 0);
    }

    #[test]
    fn fixed_binding_conflict_is_fatal() {
        // both virtuals simultaneously live and both pinned to phys 1
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            eff(vec![], vec![virt(1)]),
            stop(vec![virt(0), virt(1)]),
        ];
        let a = analyze(&effects, &[]).unwrap();
        let mut constraints = Constraints::default();
        constraints.fixed.insert(0, 1);
        constraints.fixed.insert(1, 1);
        assert!(allocate(&a, &constraints, &order_0_to_3()).is_err());
    }

    #[test]
    fn preference_honored_when_free() {
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            stop(vec![virt(0)]),
        ];
        let a = analyze(&effects, &[]).unwrap();
        let mut constraints = Constraints::default();
        constraints.preferred.insert(0, 3);
        let Outcome::Assigned(map) = allocate(&a, &constraints, &order_0_to_3()).unwrap()
        else {
            panic!()
        };
        assert_eq!(map[&0], 3);
    }

    #[test]
    fn pressure_names_lru_victim() {
        // two candidate registers, three simultaneously live virtuals;
        // v0 is least recently used at v2's definition
        let order: BankOrder = [vec![0, 1], vec![], vec![], vec![]];
        let effects = vec![
            eff(vec![], vec![virt(0)]),
            eff(vec![], vec![virt(1)]),
            eff(vec![virt(1)], vec![]),
            eff(vec![], vec![virt(2)]),
            stop(vec![virt(0), virt(1), virt(2)]),
        ];
        let a = analyze(&effects, &[]).unwrap();
        match allocate(&a, &Constraints::default(), &order).unwrap() {
            Outcome::Spill { blocked, victim } => {
                assert_eq!(blocked, 2);
                assert_eq!(victim, 0);
            }
            other => panic!("expected spill, got {other:?}"),
        }
    }
}
