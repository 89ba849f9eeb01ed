//! Control flow graph decomposition into strongly connected components.
//!
//! Tarjan's algorithm emits SCCs in reverse topological order: every SCC
//! appears after all the SCCs it can jump to. That is exactly the order the
//! backward liveness pass wants, because a block's live-out depends on the
//! live-in of its successors.
//!
//! The DFS keeps its own stack of (node, next successor) frames instead of
//! recursing, so deeply nested control flow cannot overflow the native stack.

use super::error::{LivenessError, LivenessResult};
use super::instr::{BlockId, Instruction, LiveBlock, Scc};
use std::collections::{HashMap, HashSet};

/// Split blocks into SCCs, successors first.
///
/// The DFS starts from `entry` (if given and present), then from every
/// remaining block in input order so unreachable code is still covered.
/// Jumps to labels that are not blocks of this function add no edge.
pub fn build_sccs<I: Instruction>(
    blocks: Vec<LiveBlock<I>>,
    entry: Option<&str>,
) -> Vec<Scc<LiveBlock<I>>> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let index_of: HashMap<&str, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id.as_str(), i))
        .collect();

    let mut succs: Vec<Vec<usize>> = Vec::with_capacity(blocks.len());
    let mut self_loop = vec![false; blocks.len()];
    for (i, block) in blocks.iter().enumerate() {
        let mut out = Vec::new();
        for target in block.jump_targets() {
            match index_of.get(target.as_str()) {
                Some(&j) => {
                    if j == i {
                        self_loop[i] = true;
                    }
                    out.push(j);
                }
                None => log::warn!(
                    "block '{}' jumps to '{}', which is not in this function",
                    block.id,
                    target
                ),
            }
        }
        succs.push(out);
    }

    let mut roots = Vec::with_capacity(blocks.len());
    if let Some(&e) = entry.and_then(|e| index_of.get(e)) {
        roots.push(e);
    }
    roots.extend(0..blocks.len());

    let components = tarjan(&succs, roots);

    let mut slots: Vec<Option<LiveBlock<I>>> = blocks.into_iter().map(Some).collect();
    let mut sccs = Vec::with_capacity(components.len());
    for component in components {
        if component.len() == 1 && !self_loop[component[0]] {
            if let Some(block) = slots[component[0]].take() {
                sccs.push(Scc::Acyclic(block));
            }
        } else {
            let members: Vec<_> = component.iter().filter_map(|&i| slots[i].take()).collect();
            sccs.push(Scc::Cyclic(members));
        }
    }
    sccs
}

struct Frame {
    node: usize,
    next: usize,
}

/// Tarjan's SCC algorithm over an adjacency list.
///
/// Members of each component are returned in DFS discovery order.
fn tarjan(succs: &[Vec<usize>], roots: impl IntoIterator<Item = usize>) -> Vec<Vec<usize>> {
    let n = succs.len();
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut counter = 0usize;
    let mut components = Vec::new();

    for root in roots {
        if index[root].is_some() {
            continue;
        }

        let mut frames = vec![Frame { node: root, next: 0 }];
        index[root] = Some(counter);
        lowlink[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = frames.last_mut() {
            let v = frame.node;

            if let Some(&w) = succs[v].get(frame.next) {
                frame.next += 1;
                match index[w] {
                    None => {
                        index[w] = Some(counter);
                        lowlink[w] = counter;
                        counter += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push(Frame { node: w, next: 0 });
                    }
                    Some(w_index) if on_stack[w] => {
                        lowlink[v] = lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            // All successors of v done.
            frames.pop();
            if let Some(parent) = frames.last() {
                lowlink[parent.node] = lowlink[parent.node].min(lowlink[v]);
            }

            if Some(lowlink[v]) == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.reverse();
                components.push(component);
            }
        }
    }

    components
}

/// Check that SCCs are in reverse dependent order.
///
/// Every jump to a block of this function must land in an SCC that has
/// already been seen, or in the SCC doing the jumping. If not, liveness
/// would read a live-in set that has not been computed yet.
pub fn check_reverse_dependent<I: Instruction>(sccs: &[Scc<LiveBlock<I>>]) -> LivenessResult<()> {
    let known: HashSet<&str> = sccs
        .iter()
        .flat_map(|scc| scc.iter())
        .map(|b| b.id.as_str())
        .collect();

    let mut seen: HashSet<BlockId> = HashSet::new();
    for scc in sccs {
        seen.extend(scc.iter().map(|b| b.id.clone()));

        for block in scc.iter() {
            for target in block.jump_targets() {
                if known.contains(target.as_str()) && !seen.contains(&target) {
                    return Err(LivenessError::NotReverseDependent {
                        block: block.id.clone(),
                        target,
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{MachineInst, VReg};

    fn ids(scc: &Scc<LiveBlock<MachineInst>>) -> Vec<&str> {
        scc.iter().map(|b| b.id.as_str()).collect()
    }

    fn jump_block(id: &str, targets: &[&str]) -> LiveBlock<MachineInst> {
        let mut instrs: Vec<MachineInst> = targets.iter().map(|t| MachineInst::j(*t)).collect();
        if instrs.is_empty() {
            instrs.push(MachineInst::ret());
        }
        LiveBlock::from_instrs(id, instrs)
    }

    #[test]
    fn test_straight_line_is_reverse_ordered() {
        let blocks = vec![
            jump_block("entry", &["middle"]),
            jump_block("middle", &["exit"]),
            jump_block("exit", &[]),
        ];

        let sccs = build_sccs(blocks, Some("entry"));
        assert_eq!(sccs.len(), 3);
        assert!(sccs.iter().all(|s| !s.is_cyclic()));
        assert_eq!(ids(&sccs[0]), vec!["exit"]);
        assert_eq!(ids(&sccs[1]), vec!["middle"]);
        assert_eq!(ids(&sccs[2]), vec!["entry"]);
        assert!(check_reverse_dependent(&sccs).is_ok());
    }

    #[test]
    fn test_loop_forms_cyclic_scc() {
        let blocks = vec![
            jump_block("entry", &["header"]),
            jump_block("header", &["body", "exit"]),
            jump_block("body", &["header"]),
            jump_block("exit", &[]),
        ];

        let sccs = build_sccs(blocks, Some("entry"));
        assert_eq!(sccs.len(), 3);
        assert_eq!(ids(&sccs[0]), vec!["exit"]);
        assert!(sccs[1].is_cyclic());
        assert_eq!(ids(&sccs[1]), vec!["header", "body"]);
        assert_eq!(ids(&sccs[2]), vec!["entry"]);
        assert!(check_reverse_dependent(&sccs).is_ok());
    }

    #[test]
    fn test_self_loop_is_cyclic() {
        let blocks = vec![jump_block("spin", &["spin", "out"]), jump_block("out", &[])];
        let sccs = build_sccs(blocks, Some("spin"));
        assert_eq!(sccs.len(), 2);
        assert!(!sccs[0].is_cyclic());
        assert!(sccs[1].is_cyclic());
        assert_eq!(ids(&sccs[1]), vec!["spin"]);
    }

    #[test]
    fn test_unreachable_and_unknown_targets() {
        let blocks = vec![
            jump_block("entry", &["elsewhere"]),
            jump_block("dead", &["entry"]),
        ];
        let sccs = build_sccs(blocks, Some("entry"));
        assert_eq!(sccs.len(), 2);
        assert_eq!(ids(&sccs[0]), vec!["entry"]);
        assert_eq!(ids(&sccs[1]), vec!["dead"]);
        assert!(check_reverse_dependent(&sccs).is_ok());
    }

    #[test]
    fn test_entry_scc_comes_last() {
        let blocks = vec![
            jump_block("a", &[]),
            jump_block("entry", &["a"]),
        ];
        let sccs = build_sccs(blocks, Some("entry"));
        assert_eq!(ids(&sccs[0]), vec!["a"]);
        assert_eq!(ids(&sccs[1]), vec!["entry"]);
    }

    #[test]
    fn test_wrong_order_is_rejected() {
        let v0 = VReg(0);
        let sccs = vec![
            Scc::Acyclic(LiveBlock::from_instrs(
                "entry",
                vec![MachineInst::li(v0, 1), MachineInst::j("exit")],
            )),
            Scc::Acyclic(jump_block("exit", &[])),
        ];
        let err = check_reverse_dependent(&sccs).unwrap_err();
        assert_eq!(
            err,
            LivenessError::NotReverseDependent {
                block: "entry".to_string(),
                target: "exit".to_string(),
            }
        );
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let n = 20_000;
        let blocks: Vec<_> = (0..n)
            .map(|i| {
                let next = format!("b{}", i + 1);
                if i + 1 < n {
                    jump_block(&format!("b{}", i), &[next.as_str()])
                } else {
                    jump_block(&format!("b{}", i), &[])
                }
            })
            .collect();
        let sccs = build_sccs(blocks, Some("b0"));
        assert_eq!(sccs.len(), n);
        let last = format!("b{}", n - 1);
        assert_eq!(ids(&sccs[0]), vec![last.as_str()]);
    }

    #[test]
    fn test_empty_function() {
        let sccs = build_sccs::<MachineInst>(Vec::new(), None);
        assert!(sccs.is_empty());
    }
}
