use indexmap::IndexMap;
use proptest::prelude::*;
use sirenia::geometry::rect;
use sirenia::overlap::{Fsa, FsaOptions, OneWayFsa, OneWayFsaOptions};
use sirenia::{CancelToken, Error, OverlapRemoval, Rect, Size, Way};

fn keyed(rects: &[Rect]) -> IndexMap<usize, Rect> {
    rects.iter().copied().enumerate().collect()
}

fn assert_disjoint(rects: &IndexMap<usize, Rect>) {
    let all: Vec<&Rect> = rects.values().collect();
    for (i, a) in all.iter().enumerate() {
        for b in &all[i + 1..] {
            assert!(!a.intersects(b), "{a:?} intersects {b:?}");
        }
    }
}

#[test]
fn fsa_separates_two_overlapping_boxes() {
    let input = keyed(&[
        rect(0.0, 0.0, 100.0, 50.0),
        rect(50.0, 25.0, 100.0, 50.0),
    ]);
    let output = Fsa::default()
        .compute(&input, &CancelToken::none())
        .expect("fsa");
    assert_eq!(output.len(), 2);
    for r in output.values() {
        assert_eq!(r.size, Size::new(100.0, 50.0));
    }
    assert_disjoint(&output);
}

#[test]
fn fsa_honours_gaps() {
    let input = keyed(&[rect(0.0, 0.0, 10.0, 10.0), rect(5.0, 0.0, 10.0, 10.0)]);
    let options = FsaOptions {
        horizontal_gap: 4.0,
        vertical_gap: 4.0,
        ..Default::default()
    };
    let output = Fsa::new(options)
        .compute(&input, &CancelToken::none())
        .expect("fsa");
    let (a, b) = (output[&0], output[&1]);
    assert!(b.min_x() - a.max_x() >= 4.0, "{a:?} {b:?}");
    assert_eq!((a.min_y(), b.min_y()), (0.0, 0.0));
}

#[test]
fn degenerate_inputs_come_back_unchanged() {
    let empty: IndexMap<&str, Rect> = IndexMap::new();
    assert!(Fsa::default().compute(&empty, &CancelToken::none()).expect("fsa").is_empty());

    let one: IndexMap<&str, Rect> = [("only", rect(1.0, 2.0, 3.0, 4.0))].into_iter().collect();
    assert_eq!(
        OneWayFsa::default()
            .compute(&one, &CancelToken::none())
            .expect("one-way"),
        one
    );
}

#[test]
fn output_keeps_the_input_key_order() {
    let input: IndexMap<String, Rect> = ["zeta", "alpha", "mid"]
        .iter()
        .map(|k| (k.to_string(), rect(0.0, 0.0, 10.0, 10.0)))
        .collect();
    let output = Fsa::default()
        .compute(&input, &CancelToken::none())
        .expect("fsa");
    assert_eq!(
        output.keys().collect::<Vec<_>>(),
        input.keys().collect::<Vec<_>>()
    );
}

#[test]
fn negative_gaps_are_rejected() {
    let input = keyed(&[rect(0.0, 0.0, 10.0, 10.0), rect(5.0, 0.0, 10.0, 10.0)]);
    let err = Fsa::new(FsaOptions {
        vertical_gap: -1.0,
        ..Default::default()
    })
    .compute(&input, &CancelToken::none())
    .unwrap_err();
    assert!(matches!(err, Error::InvalidOption { algorithm: "fsa", option: "vertical_gap", .. }));

    let err = OneWayFsa::new(OneWayFsaOptions {
        way: Way::Vertical,
        gap: -0.5,
    })
    .compute(&input, &CancelToken::none())
    .unwrap_err();
    assert!(matches!(err, Error::InvalidOption { option: "gap", .. }));
}

#[test]
fn vertical_one_way_keeps_x() {
    let input = keyed(&[
        rect(0.0, 0.0, 10.0, 10.0),
        rect(3.0, 2.0, 10.0, 10.0),
        rect(6.0, 4.0, 10.0, 10.0),
    ]);
    let output = OneWayFsa::new(OneWayFsaOptions {
        way: Way::Vertical,
        gap: 0.0,
    })
    .compute(&input, &CancelToken::none())
    .expect("one-way");
    for (before, after) in input.values().zip(output.values()) {
        assert_eq!(before.min_x().to_bits(), after.min_x().to_bits());
    }
    assert_disjoint(&output);
}

fn rects_strategy() -> impl Strategy<Value = Vec<Rect>> {
    prop::collection::vec(
        (
            -200.0f64..200.0,
            -200.0f64..200.0,
            1.0f64..100.0,
            1.0f64..100.0,
        )
            .prop_map(|(x, y, w, h)| rect(x, y, w, h)),
        0..16,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fsa_output_never_intersects(rects in rects_strategy()) {
        let input = keyed(&rects);
        let output = Fsa::default().compute(&input, &CancelToken::none()).unwrap();
        prop_assert_eq!(output.len(), input.len());
        for (before, after) in input.values().zip(output.values()) {
            prop_assert!((before.width() - after.width()).abs() < 1e-3);
            prop_assert!((before.height() - after.height()).abs() < 1e-3);
            prop_assert!(after.origin.is_finite());
        }
        let all: Vec<&Rect> = output.values().collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                prop_assert!(!a.intersects(b));
            }
        }
    }

    #[test]
    fn fsa_leaves_separated_rectangles_in_place(
        boxes in prop::collection::vec(
            (0.0f64..40.0, -200.0f64..200.0, 1.0f64..100.0, 1.0f64..100.0),
            0..10,
        ),
    ) {
        let rects: Vec<Rect> = boxes
            .iter()
            .enumerate()
            .map(|(i, &(jx, y, w, h))| rect(250.0 * i as f64 + jx, y, w, h))
            .collect();
        let input = keyed(&rects);
        let output = Fsa::default().compute(&input, &CancelToken::none()).unwrap();
        for (before, after) in input.values().zip(output.values()) {
            prop_assert!(before.center().distance_to(after.center()) < 1.0);
        }
    }

    #[test]
    fn horizontal_one_way_keeps_y_exactly(rects in rects_strategy()) {
        let input = keyed(&rects);
        let output = OneWayFsa::default().compute(&input, &CancelToken::none()).unwrap();
        prop_assert_eq!(output.len(), input.len());
        for (before, after) in input.values().zip(output.values()) {
            prop_assert_eq!(before.min_y().to_bits(), after.min_y().to_bits());
            prop_assert_eq!(before.size, after.size);
        }
        let all: Vec<&Rect> = output.values().collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                prop_assert!(!a.intersects(b));
            }
        }
        if !rects.is_empty() {
            let mean = |m: &IndexMap<usize, Rect>| {
                m.values().map(|r| r.center().x).sum::<f64>() / m.len() as f64
            };
            prop_assert!((mean(&input) - mean(&output)).abs() < 1e-6);
        }
    }
}
