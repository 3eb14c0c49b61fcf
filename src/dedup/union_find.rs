//! Disjoint-set forest over sample indices.

/// Union-find with path halving and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Creates `n` singleton sets.
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Returns the root of `x`'s set.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merges the sets holding `a` and `b`. Returns false if already merged.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] = self.rank[root_a].saturating_add(1);
            }
        }
        true
    }

    /// All sets, each sorted ascending, ordered by smallest member.
    pub fn components(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut slot_of_root = vec![usize::MAX; n];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for x in 0..n {
            let root = self.find(x);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = components.len();
                components.push(Vec::new());
            }
            components[slot_of_root[root]].push(x);
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singletons() {
        let mut uf = UnionFind::new(3);
        assert_eq!(uf.components(), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_union_is_transitive() {
        let mut uf = UnionFind::new(5);
        assert!(uf.union(3, 1));
        assert!(uf.union(1, 4));
        assert!(!uf.union(4, 3));
        assert_eq!(uf.find(3), uf.find(4));
        assert_eq!(uf.components(), vec![vec![0], vec![1, 3, 4], vec![2]]);
    }

    #[test]
    fn test_components_partition_indices() {
        let mut uf = UnionFind::new(100);
        for i in (0..98).step_by(3) {
            uf.union(i, i + 2);
        }
        let components = uf.components();
        let mut seen: Vec<usize> = components.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}
