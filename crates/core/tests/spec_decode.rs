//! Draft/verify/prune loop across the speculative tree and acceptance
//! statistics, driven the way a proposer and verifier would interact with
//! them over consecutive decode steps.

use specgen_core::spec_decode::{AcceptanceStats, EagleConfig, SpeculativeTree};

/// Greedy verifier stand-in: accept the longest tree path that matches the
/// expected continuation, returning (accepted depth, accepted leaf path).
fn verify(tree: &SpeculativeTree, expected: &[u32]) -> (usize, Vec<u32>) {
    let mut best: Vec<u32> = Vec::new();
    for path in tree.get_all_paths() {
        // path[0] is the root (already verified last step); the draft
        // tokens start at path[1].
        let draft = &path[1..];
        let matched = draft
            .iter()
            .zip(expected)
            .take_while(|(a, b)| a == b)
            .count();
        if matched > best.len() {
            best = draft[..matched].to_vec();
        }
    }
    (best.len(), best)
}

#[test]
fn draft_verify_prune_cycle() {
    let expected = [21u32, 22, 23];
    let mut tree = SpeculativeTree::new(20, 3);

    // Step 1: expand a two-wide tree three levels deep. The "draft model"
    // ranks the right continuation first at depths 1 and 2 but misses at
    // depth 3.
    let l1 = tree.expand(tree.root(), &[(21, -0.1), (40, -0.4)], 2);
    let l2 = tree.expand(l1[0], &[(22, -0.2), (41, -0.5)], 2);
    let l3 = tree.expand(l2[0], &[(42, -0.3), (43, -0.6)], 2);
    assert_eq!(tree.num_nodes(), 7);
    assert_eq!(tree.get_all_paths().len(), 4);

    let (accepted_depth, accepted) = verify(&tree, &expected);
    assert_eq!(accepted_depth, 2);
    assert_eq!(accepted, vec![21, 22]);

    // Prune everything past the verified depth: the rejected depth-3
    // branches disappear, the accepted spine stays.
    tree.prune(accepted_depth);
    assert!(tree.node(l2[0]).children.is_empty());
    assert!(!tree.node(l1[0]).children.is_empty());
    assert!(tree
        .get_all_paths()
        .iter()
        .all(|path| path.len() <= accepted_depth + 1));
    // The expand counter stays monotone; the live count shrinks.
    assert_eq!(tree.num_nodes(), 7);
    assert!(tree.count_reachable() < 7);
    assert!(!tree.all_leaves().contains(&l3[0]));
}

#[test]
fn acceptance_stats_drive_speculation_depth() {
    let config = EagleConfig::default();
    let stats = AcceptanceStats::new(16);

    // Warm-up: position 0 and 1 verify reliably, position 2 rarely does.
    for _ in 0..8 {
        stats.record(3, 2);
        stats.record_position(0, true);
        stats.record_position(1, true);
        stats.record_position(2, false);
    }
    stats.record_position(2, true);

    assert!((stats.get_acceptance_rate() - 2.0 / 3.0).abs() < 1e-9);

    // The proposer sizes the next tree from the windowed evidence: depth 2,
    // never more than the configured speculation budget.
    let depth = stats
        .get_optimal_depth(0.5)
        .min(config.num_speculative_tokens);
    assert_eq!(depth, 2);

    let mut tree = SpeculativeTree::new(99, depth);
    let l1 = tree.expand(tree.root(), &[(1, -0.1)], 1);
    let l2 = tree.expand(l1[0], &[(2, -0.1)], 1);
    // Depth budget exhausted: further expansion is a quiet no-op.
    assert!(tree.expand(l2[0], &[(3, -0.1)], 1).is_empty());
    assert_eq!(tree.num_nodes(), 3);
}

#[test]
fn regained_confidence_deepens_speculation() {
    let stats = AcceptanceStats::new(4);

    // A bad patch: position 1 keeps getting rejected while 0 and 2 hold.
    for _ in 0..4 {
        stats.record_position(0, true);
        stats.record_position(1, false);
        stats.record_position(2, true);
    }
    assert_eq!(stats.get_optimal_depth(0.5), 1);

    // The workload shifts and position 1 starts verifying; the rejects age
    // out of the window and the recommendation deepens again.
    for _ in 0..4 {
        stats.record_position(0, true);
        stats.record_position(1, true);
        stats.record_position(2, true);
    }
    assert_eq!(stats.get_position_acceptance_rate(1), 1.0);
    assert_eq!(stats.get_optimal_depth(0.5), 2);
}

#[test]
fn accepted_path_feeds_next_step_root() {
    let mut tree = SpeculativeTree::new(10, 2);
    let l1 = tree.expand(tree.root(), &[(11, -0.1), (30, -0.2)], 2);
    let l2 = tree.expand(l1[0], &[(12, -0.1)], 1);

    tree.mark_accepted(l2[0]);
    assert_eq!(tree.accepted_path(), &[10, 11, 12]);

    // The next step roots a fresh tree at the deepest accepted token.
    let next_root = *tree.accepted_path().last().unwrap();
    let next = SpeculativeTree::new(next_root, 2);
    assert_eq!(next.node(next.root()).token_id, 12);
}
