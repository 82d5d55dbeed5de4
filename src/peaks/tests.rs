use rand::seq::SliceRandom;
use rand::Rng;

use super::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1.0e-12
}

/// Three tight groups of five samples, 15 ms apart.
fn three_fringes() -> Vec<f64> {
    let mut out = Vec::new();
    for center in [0.005, 0.020, 0.035] {
        out.extend((0..5).map(|i| center + (f64::from(i) - 2.0) * 1.0e-4));
    }
    out
}

#[test]
fn gap_two_peaks() {
    let peaks = extract_peaks_by_gap(&[1.000, 1.001, 1.009, 1.010], 0.008).unwrap();
    assert_eq!(peaks.len(), 2);
    let c = peaks.centroids();
    assert!(close(c[0], 1.0005));
    assert!(close(c[1], 1.0095));
    assert_eq!(peaks.peaks()[0].members, 2);
    assert_eq!(peaks.peaks()[1].members, 2);
}

#[test]
fn gap_count_matches_gaps() {
    let mut rng = rand::thread_rng();
    let separation = 0.008;
    for _ in 0..100 {
        let n = rng.gen_range(1..60);
        let mut times: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..0.05)).collect();
        times.sort_by(f64::total_cmp);
        let big_gaps = times
            .windows(2)
            .filter(|w| w[1] - w[0] > separation)
            .count();
        let peaks = extract_peaks_by_gap(&times, separation).unwrap();
        assert_eq!(peaks.len(), 1 + big_gaps);
        assert_eq!(peaks.peaks().iter().map(|p| p.members).sum::<usize>(), n);
        if let Some(gap) = peaks.min_separation() {
            assert!(gap > separation);
        }
    }
}

#[test]
fn gap_merges_close_samples() {
    let peaks = extract_peaks_by_gap(&[0.0200, 0.0201], 0.008).unwrap();
    assert_eq!(peaks.len(), 1);
    assert!(close(peaks.centroids()[0], 0.02005));
}

#[test]
fn gap_order_independent() {
    let mut rng = rand::thread_rng();
    let sorted = three_fringes();
    let reference = extract_peaks_by_gap(&sorted, 0.008).unwrap();
    assert_eq!(reference.len(), 3);
    for _ in 0..20 {
        let mut shuffled = sorted.clone();
        shuffled.shuffle(&mut rng);
        assert_eq!(extract_peaks_by_gap(&shuffled, 0.008).unwrap(), reference);
    }
}

#[test]
fn gap_errors() {
    assert_eq!(
        extract_peaks_by_gap(&[], 0.008),
        Err(AnalysisError::EmptySweep)
    );
    assert!(matches!(
        extract_peaks_by_gap(&[0.1, f64::INFINITY], 0.008),
        Err(AnalysisError::InvalidInput(_))
    ));
    assert!(matches!(
        extract_peaks_by_gap(&[0.1], -1.0),
        Err(AnalysisError::InvalidInput(_))
    ));
}

#[test]
fn adaptive_finds_three() {
    let samples = three_fringes();
    let (peaks, k) =
        extract_peaks_by_adaptive_clustering(&samples, 0.008, &AdaptiveClustering::new().seed(7))
            .unwrap();
    assert_eq!(k, 3);
    let c = peaks.centroids();
    assert!((c[0] - 0.005).abs() < 1.0e-9);
    assert!((c[1] - 0.020).abs() < 1.0e-9);
    assert!((c[2] - 0.035).abs() < 1.0e-9);
    assert!(peaks.peaks().iter().all(|p| p.members == 5));
}

#[test]
fn adaptive_agrees_with_gap() {
    let samples = three_fringes();
    let gap = extract_peaks_by_gap(&samples, 0.008).unwrap();
    let (adaptive, _) =
        extract_peaks_by_adaptive_clustering(&samples, 0.008, &AdaptiveClustering::default())
            .unwrap();
    assert_eq!(gap.len(), adaptive.len());
    for (a, b) in gap.centroids().iter().zip(adaptive.centroids()) {
        assert!((a - b).abs() < 1.0e-9);
    }
}

#[test]
fn adaptive_falls_back_to_min_k() {
    // two groups only 4 ms apart; nothing clears an 8 ms separation
    let samples = [0.0100, 0.0101, 0.0102, 0.0140, 0.0141, 0.0142];
    let (peaks, k) =
        extract_peaks_by_adaptive_clustering(&samples, 0.008, &AdaptiveClustering::default())
            .unwrap();
    assert_eq!(k, 2);
    assert!(peaks.min_separation().unwrap() < 0.008);
}

#[test]
fn adaptive_skips_impossible_k() {
    let samples = [0.01, 0.03, 0.05];
    let (peaks, k) =
        extract_peaks_by_adaptive_clustering(&samples, 0.008, &AdaptiveClustering::default())
            .unwrap();
    assert_eq!(k, 3);
    assert_eq!(peaks.centroids(), vec![0.01, 0.03, 0.05]);
}

#[test]
fn adaptive_never_tries_one_cluster() {
    assert!(matches!(
        extract_peaks_by_adaptive_clustering(
            &[0.01, 0.02],
            0.008,
            &AdaptiveClustering::new().k_range(1, 5)
        ),
        Err(AnalysisError::InvalidInput(_))
    ));
    assert_eq!(
        extract_peaks_by_adaptive_clustering(
            &[0.01, 0.01, 0.01],
            0.008,
            &AdaptiveClustering::default()
        ),
        Err(AnalysisError::DegeneratePeakSet)
    );
    assert_eq!(
        extract_peaks_by_adaptive_clustering(&[], 0.008, &AdaptiveClustering::default()),
        Err(AnalysisError::EmptySweep)
    );
}

#[test]
fn adaptive_deterministic_for_seed() {
    let mut rng = rand::thread_rng();
    let samples: Vec<f64> = (0..40).map(|_| rng.gen_range(0.0..0.05)).collect();
    let settings = AdaptiveClustering::new().seed(42);
    let a = extract_peaks_by_adaptive_clustering(&samples, 0.008, &settings).unwrap();
    let b = extract_peaks_by_adaptive_clustering(&samples, 0.008, &settings).unwrap();
    assert_eq!(a, b);
}

#[test]
fn huge_samples_cluster_without_overflow() {
    let (peaks, k) = extract_peaks_by_adaptive_clustering(
        &[-1e200, 0.0, 1e200],
        0.008,
        &AdaptiveClustering::default(),
    )
    .unwrap();
    assert_eq!(k, 3);
    assert_eq!(peaks.centroids(), vec![-1e200, 0.0, 1e200]);

    let (peaks, k) = extract_peaks_by_adaptive_clustering(
        &[-f64::MAX, -f64::MAX, f64::MAX, f64::MAX],
        1.0,
        &AdaptiveClustering::default(),
    )
    .unwrap();
    assert_eq!(k, 2);
    assert_eq!(peaks.centroids(), vec![-f64::MAX, f64::MAX]);
}

#[test]
fn gap_centroid_of_huge_times_is_finite() {
    let peaks = extract_peaks_by_gap(&[1e308, 1.5e308], 1e308).unwrap();
    assert_eq!(peaks.len(), 1);
    let c = peaks.centroids()[0];
    assert!(c.is_finite());
    assert!((c / 1.25e308 - 1.0).abs() < 1.0e-12);
}
