use std::collections::BTreeSet;
use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use itinerary::{ItineraryItem, ItineraryList, TripSpan, normalize};

fn trip(days: u32, per_day: u32) -> ItineraryList {
    let items = (1..=days).flat_map(|day| {
        (1..=per_day).map(move |order| ItineraryItem::new(i64::from(day * 1000 + order), day, order, "stop"))
    });
    ItineraryList::from_items(items, &BTreeSet::new(), &TripSpan::new(days))
}

fn bench_normalize(c: &mut Criterion) {
    let list = trip(14, 12);
    let last = list.len() - 1;
    let dragged = list.move_entry(1, last).unwrap_or(list);

    c.bench_function("normalize_two_week_trip", |b| {
        b.iter(|| normalize(black_box(dragged.clone())))
    });
}

criterion_group!(benches, bench_normalize);
criterion_main!(benches);
