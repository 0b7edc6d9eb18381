//! Shared decision trees for rewrite rules.
//!
//! All rules sharing a condition compile into one DFA: an ordered vector
//! of states indexed by `u8` (root at zero, 255 reserved as the "none"
//! sentinel). A state holds sorted, disjoint transitions over inclusive
//! element ranges; feeding an element binary-searches them, records the
//! transition's rule match (deeper matches are longer, so the running
//! best is simply overwritten) and follows its successor.
//!
//! State sharing relies on one invariant: two states at the same depth are
//! equivalent exactly when the sorted sets of rule indices routed through
//! them are equal, because the remaining suffix behavior is a function of
//! that set alone. The *state linker* searches for such a state before
//! allocating, and per-state use counts recycle states orphaned by range
//! splits.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::rewrite::RewriteElement;

/// Sentinel for "no successor state".
pub const NO_STATE: u8 = 255;
/// Sentinel for "no rule matched".
pub const NO_RULE: u8 = 255;
/// Hard limit on live states per DFA.
pub const MAX_STATES: usize = 254;
/// Hard limit on transitions per state.
pub const MAX_TRANSITIONS: usize = 254;

#[derive(Clone, Copy, Debug)]
struct Transition<T> {
    first: T,
    last: T,
    rule_match: u8,
    next_state: u8,
}

#[derive(Clone, Debug)]
struct DfaState<T> {
    transitions: Vec<Transition<T>>,
    min_head_len: u8,
    max_head_len: u8,
    depth: u8,
    /// Sorted indices of the rules routed through this state.
    rules: SmallVec<[u8; 8]>,
    use_count: u16,
    in_use: bool,
}

impl<T> DfaState<T> {
    fn fresh(depth: u8) -> Self {
        Self {
            transitions: Vec::new(),
            min_head_len: 255,
            max_head_len: 0,
            depth,
            rules: SmallVec::new(),
            use_count: 0,
            in_use: true,
        }
    }

    fn note_head_len(&mut self, head_len: u8) {
        self.min_head_len = self.min_head_len.min(head_len);
        self.max_head_len = self.max_head_len.max(head_len);
    }
}

/// Scan position over one DFA. Restarted for every new scan window.
#[derive(Clone, Copy, Debug)]
pub struct DfaScanner {
    state: u8,
    scanning: bool,
    best_rule: u8,
}

impl Default for DfaScanner {
    fn default() -> Self {
        Self { state: 0, scanning: false, best_rule: NO_RULE }
    }
}

impl DfaScanner {
    pub fn restart(&mut self, active: bool) {
        self.state = 0;
        self.scanning = active;
        self.best_rule = NO_RULE;
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Index of the best (longest) rule matched so far, or [`NO_RULE`].
    pub fn best_rule(&self) -> u8 {
        self.best_rule
    }
}

/// One rule's input pattern resolved into per-element range lists, the
/// form the compiler consumes.
#[derive(Clone, Debug)]
pub struct RulePatternRanges<T> {
    /// Tester-global rule index (also the match label in the DFA).
    pub rule_index: u8,
    pub head_len: u8,
    /// Per element: sorted, disjoint, inclusive ranges.
    pub elems: Vec<Vec<(T, T)>>,
}

/// A compiled decision tree over glyph indices or code points.
#[derive(Clone, Debug)]
pub struct RewriteDfa<T: RewriteElement> {
    states: Vec<DfaState<T>>,
    free: Vec<u8>,
}

impl<T: RewriteElement> Default for RewriteDfa<T> {
    fn default() -> Self {
        Self { states: vec![DfaState::fresh(0)], free: Vec::new() }
    }
}

impl<T: RewriteElement> RewriteDfa<T> {
    /// Number of live states.
    pub fn num_states(&self) -> usize {
        self.states.len() - self.free.len()
    }

    /// Head-length bounds over the rules routed through a state.
    pub fn head_bounds(&self, state: u8) -> (u8, u8) {
        let state = &self.states[state as usize];
        (state.min_head_len, state.max_head_len)
    }

    /// Feeds one element to a scanner.
    pub fn feed(&self, scan: &mut DfaScanner, elem: T) {
        if !scan.scanning {
            return;
        }
        let state = &self.states[scan.state as usize];
        let slot = state.transitions.partition_point(|t| t.last < elem);
        if let Some(transition) = state.transitions.get(slot) {
            if transition.first <= elem {
                if transition.rule_match != NO_RULE {
                    scan.best_rule = transition.rule_match;
                }
                if transition.next_state != NO_STATE {
                    scan.state = transition.next_state;
                } else {
                    scan.scanning = false;
                }
                return;
            }
        }
        scan.scanning = false;
    }

    /// Feeds a head-context element, short-circuiting scanning when the
    /// offered head length can't belong to any rule routed through the
    /// current state.
    pub fn feed_head(&self, scan: &mut DfaScanner, elem: T, offered_head_len: u8) {
        if !scan.scanning {
            return;
        }
        let (min_head, max_head) = self.head_bounds(scan.state);
        if offered_head_len < min_head || offered_head_len > max_head {
            scan.scanning = false;
            return;
        }
        self.feed(scan, elem);
    }

    fn alloc(&mut self, depth: u8) -> Result<u8> {
        if self.num_states() >= MAX_STATES {
            return Err(Error::CompilerHitLimits);
        }
        if let Some(index) = self.free.pop() {
            self.states[index as usize] = DfaState::fresh(depth);
            return Ok(index);
        }
        let index = self.states.len();
        if index >= MAX_STATES {
            return Err(Error::CompilerHitLimits);
        }
        self.states.push(DfaState::fresh(depth));
        Ok(index as u8)
    }

    fn inc_use(&mut self, state: u8) {
        if state != NO_STATE {
            self.states[state as usize].use_count += 1;
        }
    }

    /// Decrements a state's use count, freeing and recycling it (and
    /// cascading to its successors) when nothing points at it anymore.
    fn dec_use(&mut self, state: u8) {
        let mut pending: SmallVec<[u8; 8]> = SmallVec::new();
        pending.push(state);
        while let Some(current) = pending.pop() {
            if current == NO_STATE {
                continue;
            }
            let slot = &mut self.states[current as usize];
            debug_assert!(slot.use_count > 0, "invalid internal state");
            slot.use_count -= 1;
            if slot.use_count == 0 {
                slot.in_use = false;
                for transition in core::mem::take(&mut slot.transitions) {
                    if transition.next_state != NO_STATE {
                        pending.push(transition.next_state);
                    }
                }
                slot.rules.clear();
                self.free.push(current);
            }
        }
    }

    /// The state linker: finds or allocates the state at `depth` whose
    /// rule set is the reference state's set plus `rule`. New states copy
    /// the reference's transitions so the already-routed rules keep their
    /// continuations.
    fn link_state(
        &mut self,
        reference: Option<u8>,
        rule: u8,
        head_len: u8,
        depth: u8,
    ) -> Result<u8> {
        let mut desired: SmallVec<[u8; 8]> = match reference {
            Some(reference) => self.states[reference as usize].rules.clone(),
            None => SmallVec::new(),
        };
        match desired.binary_search(&rule) {
            Ok(_) => {}
            Err(at) => desired.insert(at, rule),
        }
        for (index, state) in self.states.iter().enumerate() {
            if state.in_use && state.depth == depth && state.rules == desired {
                return Ok(index as u8);
            }
        }
        let index = self.alloc(depth)?;
        let (transitions, min_head, max_head) = match reference {
            Some(reference) => {
                let state = &self.states[reference as usize];
                (state.transitions.clone(), state.min_head_len, state.max_head_len)
            }
            None => (Vec::new(), 255, 0),
        };
        for transition in &transitions {
            let next = transition.next_state;
            self.inc_use(next);
        }
        let slot = &mut self.states[index as usize];
        slot.transitions = transitions;
        slot.rules = desired;
        slot.min_head_len = min_head.min(head_len);
        slot.max_head_len = max_head.max(head_len);
        Ok(index)
    }
}

/// Scratch state for compiling rule sets into decision trees. Reusable
/// across compilations; share one through [`crate::rewrite::pool`].
#[derive(Default)]
pub struct DfaCompiler<T: RewriteElement> {
    from_states: Vec<u8>,
    next_from: Vec<u8>,
    _elem: core::marker::PhantomData<T>,
}

impl<T: RewriteElement> DfaCompiler<T> {
    pub fn new() -> Self {
        Self {
            from_states: Vec::new(),
            next_from: Vec::new(),
            _elem: core::marker::PhantomData,
        }
    }

    /// Compiles all rules of one condition into a fresh DFA. Rules must
    /// come in ascending `rule_index` order so that earlier (lower) rules
    /// win terminal-transition ties.
    pub fn compile(&mut self, rules: &[RulePatternRanges<T>]) -> Result<RewriteDfa<T>> {
        let mut dfa = RewriteDfa::default();
        for rule in rules {
            if rule.elems.is_empty() {
                return Err(Error::InvalidRewriteRule);
            }
            dfa.states[0].note_head_len(rule.head_len);
            let root_rules = &mut dfa.states[0].rules;
            if let Err(at) = root_rules.binary_search(&rule.rule_index) {
                root_rules.insert(at, rule.rule_index);
            }
            self.from_states.clear();
            self.from_states.push(0);
            let last_elem = rule.elems.len() - 1;
            for (elem_index, ranges) in rule.elems.iter().enumerate() {
                let last = elem_index == last_elem;
                self.next_from.clear();
                for from_index in 0..self.from_states.len() {
                    let from = self.from_states[from_index];
                    for &(first, range_last) in ranges {
                        merge_range(
                            &mut dfa,
                            from,
                            first,
                            range_last,
                            rule,
                            last,
                            &mut self.next_from,
                        )?;
                    }
                }
                self.next_from.sort_unstable();
                self.next_from.dedup();
                core::mem::swap(&mut self.from_states, &mut self.next_from);
            }
        }
        Ok(dfa)
    }
}

/// Merges one inclusive range of a rule element into a state's sorted
/// transitions, splitting existing transitions as needed. Pieces covering
/// the range either record the rule match (on the rule's last element) or
/// get routed to a successor through the state linker.
fn merge_range<T: RewriteElement>(
    dfa: &mut RewriteDfa<T>,
    state: u8,
    first: T,
    last: T,
    rule: &RulePatternRanges<T>,
    is_last_elem: bool,
    out_targets: &mut Vec<u8>,
) -> Result<()> {
    let depth = dfa.states[state as usize].depth;
    let next_depth = depth.checked_add(1).ok_or(Error::CompilerHitLimits)?;
    let mut cursor = Some(first);
    let mut slot = dfa.states[state as usize]
        .transitions
        .partition_point(|t| t.last < first);

    while let Some(at) = cursor {
        if at > last {
            break;
        }
        let existing = dfa.states[state as usize].transitions.get(slot).copied();
        match existing {
            None => {
                // uncovered up to the end of the range
                let piece = new_piece(dfa, at, last, rule, is_last_elem, next_depth, out_targets)?;
                dfa.states[state as usize].transitions.insert(slot, piece);
                slot += 1;
                cursor = None;
            }
            Some(transition) if transition.first > last => {
                let piece = new_piece(dfa, at, last, rule, is_last_elem, next_depth, out_targets)?;
                dfa.states[state as usize].transitions.insert(slot, piece);
                slot += 1;
                cursor = None;
            }
            Some(transition) if transition.first > at => {
                // uncovered gap before the next transition
                let gap_last = transition.first.pred().ok_or(Error::CompilerHitLimits)?;
                let piece = new_piece(dfa, at, gap_last, rule, is_last_elem, next_depth, out_targets)?;
                dfa.states[state as usize].transitions.insert(slot, piece);
                slot += 1;
                cursor = Some(transition.first);
            }
            Some(transition) => {
                // overlap: trim the existing transition down to the
                // covered part, splitting off untouched head/tail pieces
                if transition.first < at {
                    let mut head_piece = transition;
                    head_piece.last = at.pred().ok_or(Error::CompilerHitLimits)?;
                    dfa.states[state as usize].transitions[slot].first = at;
                    dfa.states[state as usize].transitions.insert(slot, head_piece);
                    dfa.inc_use(head_piece.next_state);
                    slot += 1;
                }
                if transition.last > last {
                    let mut tail_piece = dfa.states[state as usize].transitions[slot];
                    tail_piece.first = last.succ().ok_or(Error::CompilerHitLimits)?;
                    dfa.states[state as usize].transitions[slot].last = last;
                    dfa.states[state as usize]
                        .transitions
                        .insert(slot + 1, tail_piece);
                    dfa.inc_use(tail_piece.next_state);
                }
                route_piece(dfa, state, slot, rule, is_last_elem, next_depth, out_targets)?;
                let piece_last = dfa.states[state as usize].transitions[slot].last;
                cursor = piece_last.succ();
                slot += 1;
            }
        }
    }
    if dfa.states[state as usize].transitions.len() > MAX_TRANSITIONS {
        return Err(Error::CompilerHitLimits);
    }
    Ok(())
}

/// Builds a fresh transition piece for a previously uncovered range.
fn new_piece<T: RewriteElement>(
    dfa: &mut RewriteDfa<T>,
    first: T,
    last: T,
    rule: &RulePatternRanges<T>,
    is_last_elem: bool,
    next_depth: u8,
    out_targets: &mut Vec<u8>,
) -> Result<Transition<T>> {
    if is_last_elem {
        return Ok(Transition {
            first,
            last,
            rule_match: rule.rule_index,
            next_state: NO_STATE,
        });
    }
    let target = dfa.link_state(None, rule.rule_index, rule.head_len, next_depth)?;
    dfa.inc_use(target);
    out_targets.push(target);
    Ok(Transition { first, last, rule_match: NO_RULE, next_state: target })
}

/// Routes the rule through an existing transition piece that now exactly
/// covers part of the merged range.
fn route_piece<T: RewriteElement>(
    dfa: &mut RewriteDfa<T>,
    state: u8,
    slot: usize,
    rule: &RulePatternRanges<T>,
    is_last_elem: bool,
    next_depth: u8,
    out_targets: &mut Vec<u8>,
) -> Result<()> {
    if is_last_elem {
        let transition = &mut dfa.states[state as usize].transitions[slot];
        if transition.rule_match == NO_RULE {
            // ties between rules ending on the same transition go to the
            // earliest-declared rule
            transition.rule_match = rule.rule_index;
        }
        return Ok(());
    }
    let old_next = dfa.states[state as usize].transitions[slot].next_state;
    let reference = (old_next != NO_STATE).then_some(old_next);
    let target = dfa.link_state(reference, rule.rule_index, rule.head_len, next_depth)?;
    if target != old_next {
        dfa.states[state as usize].transitions[slot].next_state = target;
        dfa.inc_use(target);
        if old_next != NO_STATE {
            dfa.dec_use(old_next);
        }
    }
    out_targets.push(target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(value: u16) -> Vec<(u16, u16)> {
        vec![(value, value)]
    }

    fn pattern(rule_index: u8, head_len: u8, elems: &[Vec<(u16, u16)>]) -> RulePatternRanges<u16> {
        RulePatternRanges { rule_index, head_len, elems: elems.to_vec() }
    }

    fn scan(dfa: &RewriteDfa<u16>, input: &[u16]) -> (u8, bool) {
        let mut scanner = DfaScanner::default();
        scanner.restart(true);
        for &elem in input {
            dfa.feed(&mut scanner, elem);
        }
        (scanner.best_rule(), scanner.is_scanning())
    }

    #[test]
    fn single_rule_matches() {
        let rules = [pattern(0, 0, &[literal(1), literal(2)])];
        let dfa = DfaCompiler::new().compile(&rules).unwrap();
        assert_eq!(scan(&dfa, &[1, 2]), (0, false));
        assert_eq!(scan(&dfa, &[1]), (NO_RULE, true));
        assert_eq!(scan(&dfa, &[2]), (NO_RULE, false));
    }

    #[test]
    fn longest_match_wins() {
        let rules = [
            pattern(0, 0, &[literal(1), literal(2)]),
            pattern(1, 0, &[literal(1), literal(2), literal(3)]),
        ];
        let dfa = DfaCompiler::new().compile(&rules).unwrap();
        // after [1, 2] the shorter rule is the best so far
        assert_eq!(scan(&dfa, &[1, 2]), (0, true));
        // the third element upgrades to the longer rule
        assert_eq!(scan(&dfa, &[1, 2, 3]), (1, false));
        // a mismatch afterwards keeps the shorter rule's match
        assert_eq!(scan(&dfa, &[1, 2, 9]), (0, false));
    }

    #[test]
    fn shared_prefix_states_are_reused() {
        // both rules continue over the same prefix, so the intermediate
        // states must be shared rather than duplicated
        let rules = [
            pattern(0, 0, &[literal(1), literal(2), literal(3)]),
            pattern(1, 0, &[literal(1), literal(2), literal(4)]),
        ];
        let dfa = DfaCompiler::new().compile(&rules).unwrap();
        // root + two shared interior states
        assert_eq!(dfa.num_states(), 3);
        assert_eq!(scan(&dfa, &[1, 2, 3]), (0, false));
        assert_eq!(scan(&dfa, &[1, 2, 4]), (1, false));
    }

    #[test]
    fn range_split_preserves_old_routing() {
        // rule 0 covers [10, 30]; rule 1 then carves out [15, 20]
        let rules = [
            pattern(0, 0, &[vec![(10, 30)], literal(2)]),
            pattern(1, 0, &[vec![(15, 20)], literal(3)]),
        ];
        let dfa = DfaCompiler::new().compile(&rules).unwrap();
        assert_eq!(scan(&dfa, &[12, 2]), (0, false));
        assert_eq!(scan(&dfa, &[17, 2]), (0, false));
        assert_eq!(scan(&dfa, &[17, 3]), (1, false));
        assert_eq!(scan(&dfa, &[25, 3]), (NO_RULE, false));
        assert_eq!(scan(&dfa, &[12, 3]), (NO_RULE, false));
    }

    #[test]
    fn tie_goes_to_earliest_rule() {
        let rules = [
            pattern(0, 0, &[literal(5), literal(6)]),
            pattern(1, 0, &[vec![(4, 7)], vec![(6, 6)]]),
        ];
        let dfa = DfaCompiler::new().compile(&rules).unwrap();
        // both rules end on [5][6]; rule 0 was declared first
        assert_eq!(scan(&dfa, &[5, 6]), (0, false));
        assert_eq!(scan(&dfa, &[4, 6]), (1, false));
    }

    #[test]
    fn head_bounds_gate_feeding() {
        let rules = [pattern(0, 2, &[literal(1), literal(2)])];
        let dfa = DfaCompiler::new().compile(&rules).unwrap();
        assert_eq!(dfa.head_bounds(0), (2, 2));
        let mut scanner = DfaScanner::default();
        scanner.restart(true);
        dfa.feed_head(&mut scanner, 1, 0);
        assert!(!scanner.is_scanning());
        scanner.restart(true);
        dfa.feed_head(&mut scanner, 1, 2);
        assert!(scanner.is_scanning());
    }

    #[test]
    fn state_limit_is_enforced() {
        // a chain long enough to exhaust the 254-state limit
        let elems: Vec<Vec<(u16, u16)>> = (0..255).map(|_| literal(1)).collect();
        let rules = [pattern(0, 0, &elems)];
        assert!(matches!(
            DfaCompiler::new().compile(&rules),
            Err(Error::CompilerHitLimits),
        ));
    }

    #[test]
    fn transition_limit_is_enforced() {
        // 255 disjoint single-element transitions out of the root
        let ranges: Vec<(u16, u16)> = (0..255).map(|v| (v * 2, v * 2)).collect();
        let rules = [pattern(0, 0, &[ranges, literal(1)])];
        assert!(matches!(
            DfaCompiler::new().compile(&rules),
            Err(Error::CompilerHitLimits),
        ));
    }
}
