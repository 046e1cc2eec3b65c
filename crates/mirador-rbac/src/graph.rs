//! Cycle detection for role and group parent graphs.
//!
//! Parent chains are a feature; cycles are not. DFS with colour marking:
//! grey marks the current path, black marks finished nodes, and meeting a
//! grey node again means the graph has a cycle.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Find a cycle reachable from `start` in `adjacency`, returning the node
/// names along the cycle path when one exists. Nodes absent from the map
/// are treated as leaves.
pub fn find_cycle(adjacency: &HashMap<String, Vec<String>>, start: &str) -> Option<Vec<String>> {
    let mut colours: HashMap<&str, Colour> = HashMap::new();
    let mut path: Vec<String> = Vec::new();
    visit(adjacency, start, &mut colours, &mut path)
}

fn visit<'a>(
    adjacency: &'a HashMap<String, Vec<String>>,
    node: &'a str,
    colours: &mut HashMap<&'a str, Colour>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    match colours.get(node).copied().unwrap_or(Colour::White) {
        Colour::Black => return None,
        Colour::Grey => {
            // Back edge: the cycle is the path suffix starting at `node`.
            let from = path.iter().position(|p| p == node).unwrap_or(0);
            let mut cycle = path[from..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        Colour::White => {}
    }

    colours.insert(node, Colour::Grey);
    path.push(node.to_string());

    if let Some(parents) = adjacency.get(node) {
        for parent in parents {
            if let Some(cycle) = visit(adjacency, parent, colours, path) {
                return Some(cycle);
            }
        }
    }

    path.pop();
    colours.insert(node, Colour::Black);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(n, ps)| (n.to_string(), ps.iter().map(|p| p.to_string()).collect()))
            .collect()
    }

    #[test]
    fn linear_chain_has_no_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert_eq!(find_cycle(&g, "a"), None);
    }

    #[test]
    fn diamond_is_acyclic() {
        let g = graph(&[("a", &["b", "c"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        assert_eq!(find_cycle(&g, "a"), None);
    }

    #[test]
    fn two_node_cycle_is_found() {
        let g = graph(&[("roleA", &["roleB"]), ("roleB", &["roleA"])]);
        let cycle = find_cycle(&g, "roleA").expect("cycle");
        assert!(cycle.contains(&"roleA".to_string()));
        assert!(cycle.contains(&"roleB".to_string()));
    }

    #[test]
    fn self_loop_is_found() {
        let g = graph(&[("a", &["a"])]);
        assert!(find_cycle(&g, "a").is_some());
    }

    #[test]
    fn unknown_parents_are_leaves() {
        let g = graph(&[("a", &["ghost"])]);
        assert_eq!(find_cycle(&g, "a"), None);
    }

    #[test]
    fn deep_cycle_behind_chain() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["d"]), ("d", &["b"])]);
        let cycle = find_cycle(&g, "a").expect("cycle");
        assert!(cycle.contains(&"b".to_string()));
        assert!(!cycle.contains(&"a".to_string()));
    }
}
