use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hideout_core::{compute_derived_state, SortMode};
use hideout_schema::{Category, HideoutSnapshot, Item, ItemRequirement, Level, Station};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const CATEGORIES: [&str; 5] = ["Money", "Building material", "Electronics", "Tools", "Medical"];

struct Fixture {
    snapshot: HideoutSnapshot,
    station_levels: HashMap<String, u32>,
    on_hand: HashMap<String, u32>,
}

fn synthetic(stations: usize, items: usize, seed: u64) -> Fixture {
    let mut rng = SmallRng::seed_from_u64(seed);
    let catalog: Vec<Item> = (0..items)
        .map(|index| {
            let category = CATEGORIES[index % CATEGORIES.len()];
            Item {
                id: format!("item-{index}"),
                name: format!("Item {index:04}"),
                short_name: format!("I{index}"),
                icon_link: String::new(),
                category: Category {
                    id: format!("cat-{}", index % CATEGORIES.len()),
                    name: category.to_string(),
                },
            }
        })
        .collect();

    let stations: Vec<Station> = (0..stations)
        .map(|index| {
            let max_level = rng.gen_range(1..=4u32);
            let levels = (1..=max_level)
                .map(|level| Level {
                    id: format!("s{index}-l{level}"),
                    level,
                    item_requirements: (0..rng.gen_range(0..6))
                        .map(|_| ItemRequirement {
                            quantity: rng.gen_range(1..20),
                            item: catalog[rng.gen_range(0..catalog.len())].clone(),
                        })
                        .collect(),
                })
                .collect();
            Station {
                id: format!("station-{index}"),
                name: format!("Station {index:03}"),
                image_link: String::new(),
                levels,
            }
        })
        .collect();

    let station_levels = stations
        .iter()
        .map(|station| (station.id.clone(), rng.gen_range(0..=station.max_level())))
        .collect();
    let on_hand = catalog
        .iter()
        .filter_map(|item| {
            rng.gen_bool(0.5)
                .then(|| (item.id.clone(), rng.gen_range(0..30)))
        })
        .collect();

    Fixture {
        snapshot: HideoutSnapshot { stations },
        station_levels,
        on_hand,
    }
}

fn bench_derive(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive");

    for stations in [25usize, 100, 400] {
        let fixture = synthetic(stations, stations * 2, 0x5eed);
        for mode in SortMode::ALL {
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), stations),
                &fixture,
                |b, fixture| {
                    b.iter(|| {
                        compute_derived_state(
                            black_box(&fixture.snapshot),
                            &fixture.station_levels,
                            &fixture.on_hand,
                            mode,
                        )
                    })
                },
            );
        }
    }

    group.finish();
}

criterion_group!(derive_benches, bench_derive);
criterion_main!(derive_benches);
