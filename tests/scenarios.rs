//! End-to-end refinement scenarios against synthetic fields.

use tinfit::{Config, Criterion, Error, HeightField, Simplifier};

fn field_from(w: usize, h: usize, f: impl Fn(usize, usize) -> u16) -> HeightField {
    let z = (0..w * h).map(|i| f(i % w, i / w)).collect();
    HeightField::new(w, h, z, None)
}

#[test]
fn flat_field_needs_only_the_initial_cover() {
    let hf = field_from(16, 16, |_, _| 100);
    let mut s = Simplifier::new(&hf, Config::default()).unwrap();
    match s.select_new_point() {
        Err(Error::HeapEmpty) => {}
        other => panic!("expected HeapEmpty, got {:?}", other),
    }
    let (v, _, f) = s.subdivision().counts();
    assert_eq!((v, f), (4, 2));
    let tris = tinfit::mesh::extract(s.subdivision(), &hf);
    assert_eq!(tris.len(), 2);
    for t in &tris {
        for p in &t.p {
            assert_eq!(p.z, 100.0);
        }
    }
}

#[test]
fn planar_ramp_terminates_immediately() {
    let hf = field_from(32, 32, |x, y| (x + y) as u16);
    let mut s = Simplifier::new(&hf, Config::default()).unwrap();
    assert_eq!(s.select_new_points(1000).unwrap(), 0);
    let (v, _, f) = s.subdivision().counts();
    assert_eq!((v, f), (4, 2));
}

#[test]
fn single_spike_is_captured_by_one_insertion() {
    let hf = field_from(32, 32, |x, y| if (x, y) == (16, 16) { 1000 } else { 0 });
    let mut s = Simplifier::new(&hf, Config::default()).unwrap();
    assert_eq!(s.top_error(), Some(1000.0));
    assert_eq!(s.select_new_points(1).unwrap(), 1);
    let (v, _, f) = s.subdivision().counts();
    assert_eq!((v, f), (5, 4));
    // the spike is now a vertex, fit exactly
    let (_, max) = s.field_errors();
    let tris = tinfit::mesh::extract(s.subdivision(), &hf);
    assert!(tris
        .iter()
        .any(|t| t.p.iter().any(|p| (p.x, p.y, p.z) == (16.0, 16.0, 1000.0))));
    assert!(max < 1000.0);
}

#[test]
fn pyramid_keeps_its_apex() {
    let hf = field_from(32, 32, |x, y| {
        (100 - (x as i64 - 16).abs().max((y as i64 - 16).abs())) as u16
    });
    let config = Config {
        criterion: Criterion::MaxInf,
        limit: 16,
        ..Config::default()
    };
    let mut s = Simplifier::new(&hf, config).unwrap();
    let n = s.select_new_points(16).unwrap();
    assert!(n >= 5);
    assert!(s.used().get(16, 16));
    let (rms, _) = s.field_errors();
    assert!(rms < 2.0, "rms {} too large for a 16-vertex pyramid", rms);
}

#[test]
fn thin_strip_supersamples_and_stays_exact() {
    let hf = field_from(1000, 2, |x, _| x as u16);
    let config = Config {
        area_thresh: 0.01,
        thresh: 1e-6,
        ..Config::default()
    };
    let mut s = Simplifier::new(&hf, config).unwrap();
    let inserted = s.select_new_points(10).unwrap();
    assert!(s.stats().nsuper > 0, "supersampled path never used");
    // z is linear in x, so the two covering triangles fit to within
    // interpolation noise and nothing clears the threshold
    assert_eq!(inserted, 0);
    if let Some(top) = s.top_error() {
        assert!(top < 1e-6, "residual error {} too large", top);
    }
}

#[test]
fn no_data_samples_never_become_vertices() {
    let hf = field_from(16, 16, |x, y| {
        if (4..12).contains(&x) && (4..12).contains(&y) {
            65535
        } else {
            (x * y) as u16
        }
    });
    let mut s = Simplifier::new(&hf, Config::default()).unwrap();
    s.select_new_points(40).unwrap();
    for x in 4..12 {
        for y in 4..12 {
            let sub = s.subdivision();
            let hit = sub.edges().any(|e| {
                let o = sub.org(e);
                let d = sub.dest(e);
                (o.x as usize, o.y as usize) == (x, y) || (d.x as usize, d.y as usize) == (x, y)
            });
            assert!(!hit, "no-data sample ({}, {}) became a vertex", x, y);
        }
    }
}

#[test]
fn data_dependent_run_reduces_error_and_stays_sound() {
    // ridge along the anti-diagonal, the worst case for the initial
    // main-diagonal triangulation
    let hf = field_from(17, 17, |x, y| {
        (64 - 4 * (x as i64 + y as i64 - 16).abs()).max(0) as u16
    });
    let config = Config {
        datadep: true,
        qual_thresh: 0.5,
        alpha: 0.5,
        ..Config::default()
    };
    let mut s = Simplifier::new(&hf, config).unwrap();
    let (rms0, _) = s.field_errors();
    s.select_new_points(12).unwrap();
    let (v, e, f) = s.subdivision().counts();
    assert_eq!(v + f, e + 1);
    let (rms, _) = s.field_errors();
    assert!(rms < rms0, "rms {} not reduced from {}", rms, rms0);
}

#[test]
fn vertex_budget_is_respected() {
    let hf = field_from(24, 24, |x, y| ((x * 31 + y * 17) % 97) as u16);
    let mut s = Simplifier::new(&hf, Config::default()).unwrap();
    assert_eq!(s.select_new_points(7).unwrap(), 7);
    assert_eq!(s.inserted(), 7);
    let (v, _, _) = s.subdivision().counts();
    assert_eq!(v, 11);
}
