//! Multi-rank unification tests.
//!
//! Each test simulates a distributed run by executing every rank on its own thread, with the
//! ranks connected through `LocalTransport`.

#![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

use std::collections::{BTreeMap, BTreeSet};

use concord::{
    Error, GlobalMapping, LocalTransport, NamespaceId, Registry, SortedTable, Tag, Transport,
    unify, unify_all, unify_table,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn registry_with(names: &[&str]) -> Registry {
    let registry = Registry::new();
    for name in names {
        registry.register_event(name);
    }
    registry
}

/// Checks that every local id of every rank maps to a global id whose name is the local name.
fn assert_mappings_valid(tables: &[Vec<String>], mappings: &[GlobalMapping]) {
    let global_names = mappings[0]
        .global_names()
        .expect("rank 0 holds the global names");

    let distinct = tables.iter().flatten().collect::<BTreeSet<_>>();
    assert_eq!(global_names.len(), distinct.len());
    assert!(global_names.iter().eq(distinct.iter().copied()));

    for (rank, (names, mapping)) in tables.iter().zip(mappings).enumerate() {
        assert_eq!(mapping.rank(), rank);
        assert_eq!(mapping.global_count(), global_names.len());
        assert_eq!(mapping.local_count(), names.len());

        for (local_id, name) in names.iter().enumerate() {
            let global_id = mapping.global_id(local_id).unwrap();
            assert_eq!(&global_names[global_id], name, "rank {rank}, local id {local_id}");
        }
    }
}

#[test]
fn four_ranks_with_overlapping_and_empty_tables() {
    let tables: [&[&str]; 4] = [&["A", "B"], &["B", "C"], &[], &["A", "D"]];

    let mappings =
        LocalTransport::run_ranks(4, |transport| {
            unify(&registry_with(tables[transport.rank()]), transport).unwrap()
        });

    assert_eq!(mappings[0].global_names().unwrap(), ["A", "B", "C", "D"]);

    for mapping in &mappings {
        assert_eq!(mapping.global_count(), 4);
    }

    assert_eq!(mappings[0].local_to_global(), [0, 1]);
    assert_eq!(mappings[1].local_to_global(), [1, 2]);
    assert!(mappings[2].local_to_global().is_empty());
    assert_eq!(mappings[3].local_to_global(), [0, 3]);

    // "B" is seen by rank 0 and rank 1 and gets the same id on both.
    assert_eq!(mappings[1].global_id(0), mappings[0].global_id(1));
}

#[test]
fn global_ids_are_independent_of_rank_count_and_registration_order() {
    const VOCABULARY: usize = 60;

    let vocabulary = (0..VOCABULARY)
        .map(|index| format!("event_{index:03}"))
        .collect::<Vec<_>>();

    for (seed, rank_count) in [1_usize, 2, 3, 5, 7, 8, 13, 16].into_iter().enumerate() {
        let mut rng = StdRng::seed_from_u64(seed as u64);

        let tables = (0..rank_count)
            .map(|_| {
                let mut names = vocabulary
                    .iter()
                    .filter(|_| rng.random_range(0..3) == 0)
                    .cloned()
                    .collect::<Vec<_>>();
                names.shuffle(&mut rng);
                names
            })
            .collect::<Vec<_>>();

        let mappings = LocalTransport::run_ranks(rank_count, |transport| {
            let names = &tables[transport.rank()];
            let refs = names.iter().map(String::as_str).collect::<Vec<_>>();

            unify(&registry_with(&refs), transport).unwrap()
        });

        assert_mappings_valid(&tables, &mappings);

        // The global id of a name is its position among all distinct names, whoever saw it.
        let distinct = tables.iter().flatten().collect::<BTreeSet<_>>();
        let expected = distinct
            .iter()
            .enumerate()
            .map(|(global_id, name)| (*name, global_id))
            .collect::<BTreeMap<_, _>>();

        for (names, mapping) in tables.iter().zip(&mappings) {
            for (local_id, name) in names.iter().enumerate() {
                assert_eq!(mapping.global_id(local_id), Some(expected[name]));
            }
        }
    }
}

#[test]
fn every_rank_seeing_everything_deduplicates() {
    let names = ["gamma", "alpha", "beta"];

    let mappings = LocalTransport::run_ranks(6, |transport| {
        let mut order = names.to_vec();
        order.rotate_left(transport.rank() % names.len());

        unify(&registry_with(&order), transport).unwrap()
    });

    for mapping in &mappings {
        assert_eq!(mapping.global_count(), 3);
    }

    assert_eq!(mappings[0].global_names().unwrap(), ["alpha", "beta", "gamma"]);
}

#[test]
fn disjoint_tables_are_concatenated_in_order() {
    let mappings = LocalTransport::run_ranks(7, |transport| {
        let name = format!("r{}", transport.rank());
        unify(&registry_with(&[&name]), transport).unwrap()
    });

    for (rank, mapping) in mappings.iter().enumerate() {
        assert_eq!(mapping.global_count(), 7);
        assert_eq!(mapping.global_id(0), Some(rank));
    }
}

#[test]
fn namespaces_have_independent_id_spaces() {
    let results = LocalTransport::run_ranks(3, |transport| {
        let functions = Registry::builder()
            .namespace(NamespaceId::FUNCTIONS)
            .build();
        let counters = Registry::builder().namespace(NamespaceId::COUNTERS).build();

        functions.register_event("main");
        functions.register_event(&format!("worker_{}", transport.rank()));
        counters.register_event("bytes_read");

        unify_all(&[&functions, &counters], transport).unwrap()
    });

    for mappings in &results {
        assert_eq!(mappings.len(), 2);

        assert_eq!(mappings[0].namespace(), NamespaceId::FUNCTIONS);
        assert_eq!(mappings[0].global_count(), 4);

        assert_eq!(mappings[1].namespace(), NamespaceId::COUNTERS);
        assert_eq!(mappings[1].global_count(), 1);
        assert_eq!(mappings[1].global_id(0), Some(0));
    }
}

#[test]
fn to_global_rekeys_per_rank_data() {
    let results = LocalTransport::run_ranks(2, |transport| {
        let registry = if transport.rank() == 0 {
            registry_with(&["write", "read"])
        } else {
            registry_with(&["read"])
        };

        let counts = registry
            .snapshot()
            .iter()
            .map(|event| event.name().len())
            .collect::<Vec<_>>();

        let mapping = unify(&registry, transport).unwrap();
        mapping.to_global(&counts)
    });

    // Global order is "read", "write".
    assert_eq!(results[0], vec![Some(4), Some(5)]);
    assert_eq!(results[1], vec![Some(4), None]);
}

#[test]
fn events_registered_after_capture_are_not_mapped() {
    let mappings = LocalTransport::run_ranks(2, |transport| {
        let registry = registry_with(&["early"]);
        let table = SortedTable::from_registry(&registry);

        registry.register_event("late");

        unify_table(registry.namespace(), &table, transport).unwrap()
    });

    assert_eq!(mappings[0].global_count(), 1);
    assert_eq!(mappings[0].global_id(0), Some(0));
    assert_eq!(mappings[0].global_id(1), None);
}

#[test]
fn malformed_table_fails_every_rank() {
    // Rank 3 is a leaf under rank 2 and answers its parent with a table that lies about its
    // length. Every real rank must fail and none may produce a mapping.
    let results = LocalTransport::run_ranks(4, |transport| {
        if transport.rank() != 3 {
            return unify(&registry_with(&["a"]), transport).map(|_| ());
        }

        transport.barrier().unwrap();

        let tag = Tag::for_namespace(NamespaceId::FUNCTIONS);
        let _request = transport.recv(2, tag).unwrap();

        // Table frame, one name of length 100 but only 2 bytes follow.
        let corrupt = vec![2, 1, 0, 0, 0, 100, 0, 0, 0, b'o', b'k'];
        transport.send(2, tag, corrupt).unwrap();

        // Rank 2 tells us the run is off.
        let _abort = transport.recv(2, tag).unwrap();
        Err(Error::Aborted { rank: 2 })
    });

    assert!(matches!(results[2], Err(Error::MalformedTable { rank: 3, .. })));
    assert!(matches!(results[0], Err(Error::Aborted { rank: 2 })));
    assert!(matches!(results[1], Err(Error::Aborted { rank: 0 })));
}

#[test]
fn failure_during_broadcast_withholds_every_mapping() {
    // Rank 0 is replaced by a root that collects the tables of its children 1 and 2, then
    // answers rank 2 with a mapping that points past the global table and rank 1 with a valid
    // one. Rank 1 holds a usable mapping but must still fail with the rest of the run.
    let results = LocalTransport::run_ranks(4, |transport| {
        if transport.rank() != 0 {
            return unify(&registry_with(&["a"]), transport).map(|_| ());
        }

        transport.barrier().unwrap();

        let tag = Tag::for_namespace(NamespaceId::FUNCTIONS);
        let request = vec![1];

        for child in [1, 2] {
            transport.send(child, tag, request.clone()).unwrap();
            let _table = transport.recv(child, tag).unwrap();
        }

        // Mapping frames: global count 1, one entry, then the global id of that entry.
        let out_of_range = vec![3, 1, 0, 0, 0, 1, 0, 0, 0, 5, 0, 0, 0];
        let valid = vec![3, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        transport.send(2, tag, out_of_range).unwrap();
        transport.send(1, tag, valid).unwrap();

        // Rank 1 acknowledges, rank 2 reports the failure.
        let _ack = transport.recv(1, tag).unwrap();
        let _abort = transport.recv(2, tag).unwrap();

        let abort = vec![6];
        transport.send(1, tag, abort).unwrap();
        Err(Error::Aborted { rank: 2 })
    });

    assert!(matches!(results[2], Err(Error::MalformedMapping { rank: 0, .. })));
    assert!(matches!(results[1], Err(Error::Aborted { rank: 0 })));
    assert!(matches!(results[3], Err(Error::Aborted { rank: 2 })));
}

#[test]
fn large_tables_unify() {
    const NAMES_PER_RANK: usize = 2_000;

    let mappings = LocalTransport::run_ranks(5, |transport| {
        let registry = Registry::new();

        // Half of the names are shared by all ranks, half are unique to this rank.
        for index in 0..NAMES_PER_RANK {
            if index % 2 == 0 {
                registry.register_event(&format!("shared_{index:05}"));
            } else {
                registry.register_event(&format!("rank_{}_{index:05}", transport.rank()));
            }
        }

        unify(&registry, transport).unwrap()
    });

    let expected = NAMES_PER_RANK / 2 + 5 * NAMES_PER_RANK / 2;

    for mapping in &mappings {
        assert_eq!(mapping.global_count(), expected);
        assert_eq!(mapping.local_count(), NAMES_PER_RANK);
    }

    // The first shared name has the same id everywhere.
    let first_shared = mappings[0].global_id(0);
    assert!(mappings.iter().all(|mapping| mapping.global_id(0) == first_shared));
}

#[test]
fn transport_can_be_used_as_trait_object() {
    let mappings = LocalTransport::run_ranks(3, |transport| {
        let transport: &dyn Transport = transport;
        unify(&registry_with(&["x", "y"]), transport).unwrap()
    });

    assert_eq!(mappings[2].global_count(), 2);
}
