//! SortedSet: a member→score map plus a skip list ordered by (score,
//! member) carrying per-level forward pointers and per-level span, so
//! rank queries are O(log n) instead of the O(n) linear scan a
//! `BTreeSet`-of-entries implementation would need.
//!
//! Modeled as an arena of nodes indexed by integer id (§9 design note on
//! cyclic ownership) rather than raw/GC'd pointers: `levels[i].forward`
//! is `Option<usize>` into `nodes`, not a pointer.

use std::cmp::Ordering;
use std::collections::HashMap;

use bytes::Bytes;
use rand::Rng;

const MAX_LEVEL: usize = 32;
const P: f64 = 0.25;

struct Level {
    forward: Option<usize>,
    span: u64,
}

struct SkipNode {
    member: Bytes,
    score: f64,
    levels: Vec<Level>,
    backward: Option<usize>,
}

/// Lexicographic order on (score, member), ignoring NaN (scores are
/// expected to be finite or ±infinity, never NaN).
fn key_cmp(score_a: f64, member_a: &[u8], score_b: f64, member_b: &[u8]) -> Ordering {
    score_a
        .partial_cmp(&score_b)
        .unwrap_or(Ordering::Equal)
        .then_with(|| member_a.cmp(member_b))
}

pub struct SortedSet {
    nodes: Vec<Option<SkipNode>>,
    free: Vec<usize>,
    header: usize,
    tail: Option<usize>,
    level: usize,
    length: usize,
    member_score: HashMap<Bytes, f64>,
}

/// Score range boundary: `<`, `≤`, or one of the infinities.
#[derive(Debug, Clone, Copy)]
pub enum ScoreBoundary {
    Inclusive(f64),
    Exclusive(f64),
    NegInfinity,
    PosInfinity,
}

impl ScoreBoundary {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "-inf" => Some(ScoreBoundary::NegInfinity),
            "+inf" | "inf" => Some(ScoreBoundary::PosInfinity),
            _ if s.starts_with('(') => s[1..].parse().ok().map(ScoreBoundary::Exclusive),
            _ => s.parse().ok().map(ScoreBoundary::Inclusive),
        }
    }

    fn satisfies_min(&self, score: f64) -> bool {
        match self {
            ScoreBoundary::Inclusive(b) => score >= *b,
            ScoreBoundary::Exclusive(b) => score > *b,
            ScoreBoundary::NegInfinity => true,
            ScoreBoundary::PosInfinity => false,
        }
    }

    fn satisfies_max(&self, score: f64) -> bool {
        match self {
            ScoreBoundary::Inclusive(b) => score <= *b,
            ScoreBoundary::Exclusive(b) => score < *b,
            ScoreBoundary::NegInfinity => false,
            ScoreBoundary::PosInfinity => true,
        }
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedSet {
    pub fn new() -> Self {
        let header = SkipNode {
            member: Bytes::new(),
            score: f64::NEG_INFINITY,
            levels: (0..MAX_LEVEL)
                .map(|_| Level {
                    forward: None,
                    span: 0,
                })
                .collect(),
            backward: None,
        };
        Self {
            nodes: vec![Some(header)],
            free: Vec::new(),
            header: 0,
            tail: None,
            level: 1,
            length: 0,
            member_score: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn node(&self, idx: usize) -> &SkipNode {
        self.nodes[idx].as_ref().unwrap()
    }

    fn node_mut(&mut self, idx: usize) -> &mut SkipNode {
        self.nodes[idx].as_mut().unwrap()
    }

    fn random_level() -> usize {
        let mut level = 1;
        let mut rng = rand::thread_rng();
        while rng.gen::<f64>() < P && level < MAX_LEVEL {
            level += 1;
        }
        level
    }

    pub fn get_score(&self, member: &[u8]) -> Option<f64> {
        self.member_score.get(member).copied()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.member_score.contains_key(member)
    }

    /// Inserts or updates `member`'s score. Returns `true` if this is a
    /// new member.
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        if let Some(&old_score) = self.member_score.get(&member) {
            if old_score != score {
                self.remove_node(old_score, &member);
                self.insert_node(member.clone(), score);
            }
            self.member_score.insert(member, score);
            false
        } else {
            self.insert_node(member.clone(), score);
            self.member_score.insert(member, score);
            true
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.member_score.remove(member) {
            Some(score) => {
                self.remove_node(score, member);
                true
            }
            None => false,
        }
    }

    fn insert_node(&mut self, member: Bytes, score: f64) {
        let mut update = [0usize; MAX_LEVEL];
        let mut rank = [0u64; MAX_LEVEL];
        let mut x = self.header;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let Some(fwd) = self.node(x).levels[i].forward else {
                    break;
                };
                let fwd_node = self.node(fwd);
                if key_cmp(fwd_node.score, &fwd_node.member, score, &member) == Ordering::Less {
                    rank[i] += self.node(x).levels[i].span;
                    x = fwd;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let new_level = Self::random_level();
        if new_level > self.level {
            for i in self.level..new_level {
                rank[i] = 0;
                update[i] = self.header;
                self.node_mut(self.header).levels[i].span = self.length as u64;
            }
            self.level = new_level;
        }

        let new_idx = if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Some(SkipNode {
                member: member.clone(),
                score,
                levels: (0..new_level)
                    .map(|_| Level { forward: None, span: 0 })
                    .collect(),
                backward: None,
            });
            idx
        } else {
            self.nodes.push(Some(SkipNode {
                member: member.clone(),
                score,
                levels: (0..new_level)
                    .map(|_| Level { forward: None, span: 0 })
                    .collect(),
                backward: None,
            }));
            self.nodes.len() - 1
        };

        for i in 0..new_level {
            let pred = update[i];
            let pred_fwd = self.node(pred).levels[i].forward;
            self.node_mut(new_idx).levels[i].forward = pred_fwd;
            self.node_mut(pred).levels[i].forward = Some(new_idx);
            let span = self.node(pred).levels[i].span;
            self.node_mut(new_idx).levels[i].span = span - (rank[0] - rank[i]);
            self.node_mut(pred).levels[i].span = (rank[0] - rank[i]) + 1;
        }
        for i in new_level..self.level {
            self.node_mut(update[i]).levels[i].span += 1;
        }

        self.node_mut(new_idx).backward = if update[0] == self.header {
            None
        } else {
            Some(update[0])
        };
        if let Some(fwd) = self.node(new_idx).levels[0].forward {
            self.node_mut(fwd).backward = Some(new_idx);
        } else {
            self.tail = Some(new_idx);
        }
        self.length += 1;
    }

    fn remove_node(&mut self, score: f64, member: &[u8]) {
        let mut update = [0usize; MAX_LEVEL];
        let mut x = self.header;
        for i in (0..self.level).rev() {
            loop {
                let Some(fwd) = self.node(x).levels[i].forward else {
                    break;
                };
                let fwd_node = self.node(fwd);
                if key_cmp(fwd_node.score, &fwd_node.member, score, member) == Ordering::Less {
                    x = fwd;
                } else {
                    break;
                }
            }
            update[i] = x;
        }
        let Some(target) = self.node(x).levels[0].forward else {
            return;
        };
        if self.node(target).score != score || self.node(target).member != member {
            return;
        }
        let target_levels = self.node(target).levels.len();
        for i in 0..self.level {
            let pred = update[i];
            if i < target_levels && self.node(pred).levels[i].forward == Some(target) {
                let target_span = self.node(target).levels[i].span;
                self.node_mut(pred).levels[i].span += target_span - 1;
                let target_fwd = self.node(target).levels[i].forward;
                self.node_mut(pred).levels[i].forward = target_fwd;
            } else {
                self.node_mut(pred).levels[i].span -= 1;
            }
        }
        if let Some(fwd) = self.node(target).levels[0].forward {
            let backward = self.node(target).backward;
            self.node_mut(fwd).backward = backward;
        } else {
            self.tail = self.node(target).backward;
        }
        while self.level > 1 && self.node(self.header).levels[self.level - 1].forward.is_none() {
            self.level -= 1;
        }
        self.nodes[target] = None;
        self.free.push(target);
        self.length -= 1;
    }

    /// 0-based rank, ascending by (score, member). `None` if absent.
    pub fn rank_of(&self, member: &[u8]) -> Option<u64> {
        let score = *self.member_score.get(member)?;
        let mut x = self.header;
        let mut rank: u64 = 0;
        for i in (0..self.level).rev() {
            loop {
                let Some(fwd) = self.node(x).levels[i].forward else {
                    break;
                };
                let fwd_node = self.node(fwd);
                let matched = fwd_node.score == score && fwd_node.member == member;
                if key_cmp(fwd_node.score, &fwd_node.member, score, member) == Ordering::Less
                    || matched
                {
                    rank += self.node(x).levels[i].span;
                    x = fwd;
                    if matched {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        if x != self.header && self.node(x).member == member {
            Some(rank - 1)
        } else {
            None
        }
    }

    pub fn rev_rank_of(&self, member: &[u8]) -> Option<u64> {
        self.rank_of(member).map(|r| self.length as u64 - 1 - r)
    }

    fn nth(&self, mut idx: u64) -> Option<&SkipNode> {
        let mut x = self.header;
        for i in (0..self.level).rev() {
            loop {
                let Some(fwd) = self.node(x).levels[i].forward else {
                    break;
                };
                let span = self.node(x).levels[i].span;
                if span <= idx {
                    idx -= span;
                    x = fwd;
                } else {
                    break;
                }
            }
        }
        let Some(fwd) = self.node(x).levels[0].forward else {
            return None;
        };
        if idx == 0 { Some(self.node(fwd)) } else { None }
    }

    /// Ascending range `[start, stop]` (0-based, inclusive, saturating).
    pub fn range(&self, start: i64, stop: i64) -> Vec<(Bytes, f64)> {
        self.range_inner(start, stop, false)
    }

    pub fn rev_range(&self, start: i64, stop: i64) -> Vec<(Bytes, f64)> {
        self.range_inner(start, stop, true)
    }

    fn range_inner(&self, start: i64, stop: i64, rev: bool) -> Vec<(Bytes, f64)> {
        let len = self.length as i64;
        if len == 0 {
            return Vec::new();
        }
        let norm = |i: i64| if i < 0 { (len + i).max(0) } else { i };
        let start = norm(start).max(0);
        let stop = norm(stop).min(len - 1);
        if start > stop {
            return Vec::new();
        }
        let mut out = Vec::with_capacity((stop - start + 1) as usize);
        for i in start..=stop {
            let idx = if rev { (len - 1 - i) as u64 } else { i as u64 };
            if let Some(node) = self.nth(idx) {
                out.push((node.member.clone(), node.score));
            }
        }
        out
    }

    pub fn range_by_score(&self, min: ScoreBoundary, max: ScoreBoundary) -> Vec<(Bytes, f64)> {
        let mut out = Vec::new();
        let mut cur = self.node(self.header).levels[0].forward;
        while let Some(idx) = cur {
            let node = self.node(idx);
            if !min.satisfies_min(node.score) {
                cur = node.levels[0].forward;
                continue;
            }
            if !max.satisfies_max(node.score) {
                break;
            }
            out.push((node.member.clone(), node.score));
            cur = node.levels[0].forward;
        }
        out
    }

    pub fn remove_range_by_score(&mut self, min: ScoreBoundary, max: ScoreBoundary) -> u64 {
        let victims: Vec<Bytes> = self
            .range_by_score(min, max)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        let count = victims.len() as u64;
        for m in victims {
            self.remove(&m);
        }
        count
    }

    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> u64 {
        let victims: Vec<Bytes> = self
            .range(start, stop)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        let count = victims.len() as u64;
        for m in victims {
            self.remove(&m);
        }
        count
    }

    pub fn pop_min(&mut self, count: usize) -> Vec<(Bytes, f64)> {
        let victims = self.range(0, count.saturating_sub(1) as i64);
        for (m, _) in &victims {
            self.remove(m);
        }
        victims
    }

    pub fn count_by_score(&self, min: ScoreBoundary, max: ScoreBoundary) -> u64 {
        self.range_by_score(min, max).len() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        let mut cur = self.node(self.header).levels[0].forward;
        std::iter::from_fn(move || {
            let idx = cur?;
            let node = self.node(idx);
            cur = node.levels[0].forward;
            Some((&node.member, node.score))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, f64)]) -> SortedSet {
        let mut s = SortedSet::new();
        for (m, sc) in pairs {
            s.add(Bytes::from(m.to_string()), *sc);
        }
        s
    }

    #[test]
    fn add_and_rank_matches_insertion_order_by_score() {
        let s = set(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(s.rank_of(b"a"), Some(0));
        assert_eq!(s.rank_of(b"b"), Some(1));
        assert_eq!(s.rank_of(b"c"), Some(2));
        assert_eq!(s.rev_rank_of(b"c"), Some(0));
    }

    #[test]
    fn range_by_score_open_and_closed() {
        let s = set(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let r = s.range_by_score(ScoreBoundary::Exclusive(1.0), ScoreBoundary::PosInfinity);
        assert_eq!(
            r.into_iter().map(|(m, _)| m).collect::<Vec<_>>(),
            vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")]
        );
        let r = s.range_by_score(ScoreBoundary::NegInfinity, ScoreBoundary::Inclusive(2.0));
        assert_eq!(
            r.into_iter().map(|(m, _)| m).collect::<Vec<_>>(),
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }

    #[test]
    fn remove_then_rank_is_none() {
        let mut s = set(&[("a", 1.0), ("b", 2.0)]);
        assert!(s.remove(b"a"));
        assert_eq!(s.rank_of(b"a"), None);
        assert_eq!(s.rank_of(b"b"), Some(0));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn update_score_moves_rank() {
        let mut s = set(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        s.add(Bytes::from_static(b"a"), 5.0);
        assert_eq!(s.rank_of(b"a"), Some(2));
        assert_eq!(s.get_score(b"a"), Some(5.0));
    }

    #[test]
    fn rank_is_correct_across_many_inserts() {
        let mut s = SortedSet::new();
        for i in 0..500 {
            s.add(Bytes::from(format!("m{i:04}")), i as f64);
        }
        assert_eq!(s.len(), 500);
        for i in 0..500 {
            let member = format!("m{i:04}");
            assert_eq!(s.rank_of(member.as_bytes()), Some(i as u64));
        }
    }

    #[test]
    fn pop_min_removes_lowest_scores() {
        let mut s = set(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let popped = s.pop_min(2);
        assert_eq!(popped[0].0, Bytes::from_static(b"a"));
        assert_eq!(popped[1].0, Bytes::from_static(b"b"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn score_boundary_parsing() {
        assert!(matches!(
            ScoreBoundary::parse("-inf"),
            Some(ScoreBoundary::NegInfinity)
        ));
        assert!(matches!(
            ScoreBoundary::parse("+inf"),
            Some(ScoreBoundary::PosInfinity)
        ));
        assert!(matches!(
            ScoreBoundary::parse("(1.5"),
            Some(ScoreBoundary::Exclusive(v)) if v == 1.5
        ));
        assert!(matches!(
            ScoreBoundary::parse("2.5"),
            Some(ScoreBoundary::Inclusive(v)) if v == 2.5
        ));
    }
}
