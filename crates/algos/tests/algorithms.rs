//! End-to-end properties across the algorithm suite.

use std::sync::atomic::Ordering;

use gds_algos::prelude::*;
use gds_engine::prelude::*;

fn grid_graph(width: Offset, height: Offset) -> (MemoryGraph, TableId) {
    let mut builder = MemoryGraphBuilder::new();
    let nodes = builder.add_node_table(width * height);
    let mut edges = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let node = y * width + x;
            if x + 1 < width {
                edges.push((node, node + 1));
            }
            if y + 1 < height {
                edges.push((node, node + width));
            }
        }
    }
    builder.add_rel_table(nodes, nodes, edges);
    (builder.build(), nodes)
}

#[test]
fn sp_lengths_match_manhattan_distance_on_a_grid() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (graph, nodes) = grid_graph(4, 4);
    let ctx = ExecContext::new(4);
    let config = ShortestPathConfig {
        upper_bound: 10,
        direction: Direction::Both,
        ..Default::default()
    };
    let rows = single_sp_destinations(&ctx, &graph, NodeId::new(0, nodes), config).unwrap();

    assert_eq!(rows.len(), 15);
    for row in &rows {
        let (x, y) = (row.dst.offset % 4, row.dst.offset / 4);
        assert_eq!(row.length, (x + y) as i64, "wrong distance to {:?}", row.dst);
    }
}

#[test]
fn asp_multiplicities_count_grid_lattice_paths() {
    let (graph, nodes) = grid_graph(3, 3);
    let ctx = ExecContext::new(4);
    let config = ShortestPathConfig {
        upper_bound: 10,
        direction: Direction::Both,
        ..Default::default()
    };
    let rows = all_sp_destinations(&ctx, &graph, NodeId::new(0, nodes), config).unwrap();

    // Shortest paths to the opposite corner of a 3x3 grid: C(4, 2) = 6.
    let corner = rows.iter().filter(|r| r.dst.offset == 8).count();
    assert_eq!(corner, 6);
}

#[test]
fn wsp_costs_match_unweighted_lengths_on_unit_weights() {
    let mut builder = MemoryGraphBuilder::new();
    let nodes = builder.add_node_table(6);
    let edges = vec![(0, 1), (1, 2), (2, 3), (0, 4), (4, 3), (3, 5)];
    builder.add_rel_table_weighted(
        nodes,
        nodes,
        "w",
        edges.iter().map(|&(a, b)| (a, b, 1.0)).collect::<Vec<_>>(),
    );
    let graph = builder.build();
    let ctx = ExecContext::new(2);

    let weighted = wsp_destinations(
        &ctx,
        &graph,
        NodeId::new(0, nodes),
        WeightedPathConfig {
            weight_property: "w".to_owned(),
            ..Default::default()
        },
    )
    .unwrap();
    let unweighted = single_sp_destinations(
        &ctx,
        &graph,
        NodeId::new(0, nodes),
        ShortestPathConfig {
            upper_bound: 10,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(weighted.len(), unweighted.len());
    for row in &unweighted {
        let cost = weighted
            .iter()
            .find(|c| c.dst == row.dst)
            .expect("destination missing from weighted run")
            .cost;
        assert_eq!(cost, row.length as f64);
    }
}

#[test]
fn k_core_subgraphs_have_minimum_degree_k() {
    let (graph, nodes) = grid_graph(4, 4);
    let ctx = ExecContext::new(4);
    let rows = k_core(&ctx, &graph, KCoreConfig::default()).unwrap();

    let core_of = |offset: Offset| {
        rows.iter()
            .find(|r| r.node.offset == offset)
            .unwrap()
            .k_degree
    };
    // For every k, each vertex of the induced subgraph {core >= k} keeps
    // at least k neighbors inside it.
    let max_core = rows.iter().map(|r| r.k_degree).max().unwrap();
    for k in 0..=max_core {
        for row in rows.iter().filter(|r| r.k_degree >= k) {
            let (x, y) = (row.node.offset % 4, row.node.offset / 4);
            let neighbors = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            let inside = neighbors
                .iter()
                .filter(|&&(nx, ny)| nx < 4 && ny < 4 && core_of(ny * 4 + nx) >= k)
                .count();
            assert!(inside as i64 >= k, "node {:?} at k {}", row.node, k);
        }
    }
    // The 4x4 grid peels completely at core 2.
    assert_eq!(max_core, 2);
}

#[test]
fn kruskal_min_forest_weight_is_minimal() {
    let mut builder = MemoryGraphBuilder::new();
    let nodes = builder.add_node_table(5);
    let edges = vec![
        (0, 1, 2.0),
        (0, 2, 4.0),
        (1, 2, 1.0),
        (1, 3, 7.0),
        (2, 3, 3.0),
        (3, 4, 5.0),
        (2, 4, 8.0),
    ];
    builder.add_rel_table_weighted(nodes, nodes, "w", edges.clone());
    let graph = builder.build();

    let rows = spanning_forest(
        &ExecContext::new(1),
        &graph,
        SpanningForestConfig {
            weight_property: "w".to_owned(),
            ..Default::default()
        },
    )
    .unwrap();

    let weight_of = |src: Offset, dst: Offset| {
        edges
            .iter()
            .find(|&&(a, b, _)| (a, b) == (src, dst))
            .unwrap()
            .2
    };
    let total: f64 = rows
        .iter()
        .map(|r| weight_of(r.src.offset, r.dst.offset))
        .sum();
    assert_eq!(rows.len(), 4);
    // Kruskal on this graph picks 1+2+3+5.
    assert_eq!(total, 11.0);
    // Single component, single forest id.
    assert!(rows.iter().all(|r| r.forest_id == rows[0].forest_id));
}

#[test]
fn connectivity_algorithms_agree_on_undirected_components() {
    let mut builder = MemoryGraphBuilder::new();
    let nodes = builder.add_node_table(8);
    builder.add_rel_table(
        nodes,
        nodes,
        vec![(0, 1), (1, 2), (2, 0), (3, 4), (5, 6), (6, 5)],
    );
    let graph = builder.build();
    let ctx = ExecContext::new(2);

    let rows = wcc(&ctx, &graph, WccConfig::default()).unwrap();
    let group = |offset: Offset| {
        rows.iter()
            .find(|r| r.node.offset == offset)
            .unwrap()
            .group_id
    };
    let distinct: std::collections::HashSet<_> = rows.iter().map(|r| r.group_id).collect();
    // {0,1,2}, {3,4}, {5,6}, {7}.
    assert_eq!(distinct.len(), 4);
    assert_eq!(group(3), group(4));
    assert_ne!(group(0), group(7));
}

#[test]
fn rerunning_yields_identical_rows_for_deterministic_algorithms() {
    let mut builder = MemoryGraphBuilder::new();
    let nodes = builder.add_node_table(6);
    builder.add_rel_table_weighted(
        nodes,
        nodes,
        "w",
        vec![
            (0, 1, 1.0),
            (1, 2, 2.0),
            (2, 3, 1.5),
            (3, 0, 2.5),
            (4, 5, 1.0),
        ],
    );
    let graph = builder.build();
    let ctx = ExecContext::new(1);
    let config = SpanningForestConfig {
        weight_property: "w".to_owned(),
        ..Default::default()
    };

    let first = spanning_forest(&ctx, &graph, config.clone()).unwrap();
    let second = spanning_forest(&ctx, &graph, config).unwrap();
    assert_eq!(first, second);

    let kosaraju_first = scc_kosaraju(&ctx, &graph).unwrap();
    let kosaraju_second = scc_kosaraju(&ctx, &graph).unwrap();
    assert_eq!(kosaraju_first, kosaraju_second);
}

#[test]
fn interrupt_flag_stops_an_invocation() {
    let (graph, _) = grid_graph(8, 8);
    let ctx = ExecContext::new(2);
    ctx.interrupt_flag().store(true, Ordering::Relaxed);

    let result = wcc(&ctx, &graph, WccConfig::default());
    assert!(matches!(result, Err(Error::Interrupted)));
}
