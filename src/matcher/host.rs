//! Host and domain suffix index.
//!
//! Hosts are decomposed into dot-separated labels and inserted into a
//! trie keyed from the TLD side, so `www.example.com` walks
//! `com → example → www`. A domain entry (`dest_domain=example.com`)
//! sits at its node and matches that host and every subdomain; an
//! exact-host entry matches only when the whole host is consumed. The
//! bare domain `.` lives at the root and matches everything.
//!
//! Lookup yields *every* matching leaf, not just the first: the
//! cross-index tie-break needs all candidates.

use std::collections::HashMap;

#[derive(Debug)]
struct HostLeaf<T> {
    /// Domain-suffix entry (true) vs exact-host entry (false).
    domain: bool,
    value: T,
}

#[derive(Debug)]
struct HostNode<T> {
    children: HashMap<String, HostNode<T>>,
    leaves: Vec<HostLeaf<T>>,
}

impl<T> HostNode<T> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            leaves: Vec::new(),
        }
    }
}

/// Suffix trie mapping host names to payloads.
#[derive(Debug)]
pub struct HostTable<T> {
    root: HostNode<T>,
    len: usize,
}

impl<T> HostTable<T> {
    pub fn new() -> Self {
        Self {
            root: HostNode::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert an entry. `domain` selects suffix matching; the bare
    /// name `.` (or an empty name) attaches to the root and matches
    /// any host.
    pub fn insert(&mut self, name: &str, domain: bool, value: T) {
        let mut node = &mut self.root;
        for label in labels_tld_first(name) {
            node = node
                .children
                .entry(label.to_ascii_lowercase())
                .or_insert_with(HostNode::new);
        }
        node.leaves.push(HostLeaf { domain, value });
        self.len += 1;
    }

    /// All payloads whose entry matches `host`. Restartable: the
    /// returned iterator owns its position and can be advanced
    /// independently of any other lookup.
    pub fn matches<'a>(&'a self, host: &str) -> HostMatches<'a, T> {
        let mut hits = Vec::new();
        let mut node = &self.root;
        collect_domain_leaves(node, &mut hits);

        let host_labels: Vec<String> = labels_tld_first(host)
            .map(|l| l.to_ascii_lowercase())
            .collect();
        let mut depth = 0;
        for label in &host_labels {
            match node.children.get(label) {
                Some(child) => {
                    node = child;
                    depth += 1;
                    collect_domain_leaves(node, &mut hits);
                }
                None => break,
            }
        }
        // Exact-host leaves apply only when the full host was consumed.
        if depth == host_labels.len() {
            for leaf in &node.leaves {
                if !leaf.domain {
                    hits.push(&leaf.value);
                }
            }
        }
        HostMatches { hits, pos: 0 }
    }
}

impl<T> Default for HostTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_domain_leaves<'a, T>(node: &'a HostNode<T>, hits: &mut Vec<&'a T>) {
    for leaf in &node.leaves {
        if leaf.domain {
            hits.push(&leaf.value);
        }
    }
}

fn labels_tld_first(name: &str) -> impl Iterator<Item = &str> {
    name.trim_matches('.')
        .rsplit('.')
        .filter(|l| !l.is_empty())
}

/// Iterator over matching leaves, least specific first.
#[derive(Debug)]
pub struct HostMatches<'a, T> {
    hits: Vec<&'a T>,
    pos: usize,
}

impl<'a, T> Iterator for HostMatches<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let item = self.hits.get(self.pos)?;
        self.pos += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect<'a>(t: &'a HostTable<u32>, host: &str) -> Vec<u32> {
        t.matches(host).copied().collect()
    }

    #[test]
    fn domain_matches_itself_and_subdomains() {
        let mut t = HostTable::new();
        t.insert("example.com", true, 1);
        assert_eq!(collect(&t, "example.com"), vec![1]);
        assert_eq!(collect(&t, "www.example.com"), vec![1]);
        assert_eq!(collect(&t, "a.b.example.com"), vec![1]);
        assert!(collect(&t, "example.org").is_empty());
        // Suffix must fall on a label boundary.
        assert!(collect(&t, "badexample.com").is_empty());
    }

    #[test]
    fn exact_host_requires_full_match() {
        let mut t = HostTable::new();
        t.insert("www.pilot.net", false, 7);
        assert_eq!(collect(&t, "www.pilot.net"), vec![7]);
        assert!(collect(&t, "pilot.net").is_empty());
        assert!(collect(&t, "a.www.pilot.net").is_empty());
    }

    #[test]
    fn dot_matches_everything() {
        let mut t = HostTable::new();
        t.insert(".", true, 9);
        assert_eq!(collect(&t, "anything.at.all"), vec![9]);
        assert_eq!(collect(&t, "x"), vec![9]);
    }

    #[test]
    fn all_matching_leaves_are_yielded() {
        let mut t = HostTable::new();
        t.insert(".", true, 1);
        t.insert("i.am", true, 2);
        t.insert("rabbit.i.am", true, 3);
        t.insert("a.rabbit.i.am", false, 4);
        assert_eq!(collect(&t, "a.rabbit.i.am"), vec![1, 2, 3, 4]);
        assert_eq!(collect(&t, "rabbit.i.am"), vec![1, 2, 3]);
        assert_eq!(collect(&t, "b.rabbit.i.am"), vec![1, 2, 3]);
    }

    #[test]
    fn case_insensitive() {
        let mut t = HostTable::new();
        t.insert("Example.COM", true, 5);
        assert_eq!(collect(&t, "WWW.EXAMPLE.com"), vec![5]);
    }

    #[test]
    fn restartable_iteration() {
        let mut t = HostTable::new();
        t.insert("i.am", true, 1);
        t.insert("rabbit.i.am", true, 2);
        let mut it = t.matches("x.rabbit.i.am");
        assert_eq!(it.next(), Some(&1));
        let mut second = t.matches("x.rabbit.i.am");
        assert_eq!(second.next(), Some(&1));
        assert_eq!(it.next(), Some(&2));
        assert_eq!(it.next(), None);
    }
}
