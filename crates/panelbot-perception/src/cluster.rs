//! K-means grouping of circle detections.
//!
//! The Hough stage returns several overlapping circles per wrench head.
//! Clustering their centres into exactly `k` groups yields one
//! representative head per wrench.  Initialization is deterministic
//! (farthest-first seeding from the left-most centre), so identical input
//! always produces identical clusters.

use panelbot_types::Pixel;

use crate::error::LocalizeError;
use crate::hough::Circle;

/// One group of circle detections.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleCluster {
    /// Mean centre of the member circles.
    pub center: Pixel,
    /// Mean radius of the member circles.
    pub mean_radius: f64,
    pub members: usize,
}

/// Cluster `circles` by centre into `k` groups, returned sorted by `x`.
///
/// Iterates until no centre moves more than `eps` pixels or `max_iter`
/// rounds have run.  An empty cluster is re-seeded with the point farthest
/// from its current centre.
///
/// # Errors
///
/// [`LocalizeError::Clustering`] when `k` is zero or there are fewer circles
/// than clusters.
pub fn cluster_circles(
    circles: &[Circle],
    k: usize,
    max_iter: usize,
    eps: f64,
) -> Result<Vec<CircleCluster>, LocalizeError> {
    if k == 0 {
        return Err(LocalizeError::Clustering("cluster count must be positive".into()));
    }
    if circles.len() < k {
        return Err(LocalizeError::Clustering(format!(
            "{} circles cannot form {k} clusters",
            circles.len()
        )));
    }

    let mut sorted: Vec<&Circle> = circles.iter().collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));

    let n = sorted.len();
    let mut centers = farthest_first_seeds(&sorted, k);
    let mut assignment = vec![0usize; n];

    for _ in 0..max_iter {
        for (slot, c) in assignment.iter_mut().zip(&sorted) {
            *slot = nearest(&centers, c.x, c.y);
        }

        let mut sums = vec![(0.0f64, 0.0f64, 0usize); k];
        for (&a, c) in assignment.iter().zip(&sorted) {
            sums[a].0 += c.x;
            sums[a].1 += c.y;
            sums[a].2 += 1;
        }

        let mut shift = 0.0f64;
        for (j, &(sx, sy, count)) in sums.iter().enumerate() {
            let next = if count == 0 {
                farthest_point(&sorted, &assignment, &centers)
            } else {
                (sx / count as f64, sy / count as f64)
            };
            shift = shift.max((next.0 - centers[j].0).hypot(next.1 - centers[j].1));
            centers[j] = next;
        }
        if shift < eps {
            break;
        }
    }

    for (slot, c) in assignment.iter_mut().zip(&sorted) {
        *slot = nearest(&centers, c.x, c.y);
    }

    let mut clusters = Vec::with_capacity(k);
    for j in 0..k {
        let members: Vec<&&Circle> = sorted
            .iter()
            .zip(&assignment)
            .filter_map(|(c, &a)| (a == j).then_some(c))
            .collect();
        if members.is_empty() {
            return Err(LocalizeError::Clustering(format!("cluster {j} is empty")));
        }
        let m = members.len() as f64;
        clusters.push(CircleCluster {
            center: Pixel::new(
                members.iter().map(|c| c.x).sum::<f64>() / m,
                members.iter().map(|c| c.y).sum::<f64>() / m,
            ),
            mean_radius: members.iter().map(|c| c.radius).sum::<f64>() / m,
            members: members.len(),
        });
    }
    clusters.sort_by(|a, b| a.center.x.total_cmp(&b.center.x));
    Ok(clusters)
}

/// Left-most point first, then repeatedly the point farthest from every
/// seed chosen so far.  Ties go to the earlier point in x order.
fn farthest_first_seeds(sorted: &[&Circle], k: usize) -> Vec<(f64, f64)> {
    let mut seeds = vec![(sorted[0].x, sorted[0].y)];
    while seeds.len() < k {
        let mut best = (sorted[0].x, sorted[0].y);
        let mut best_d = -1.0f64;
        for c in sorted {
            let d = seeds
                .iter()
                .map(|&(sx, sy)| (c.x - sx).powi(2) + (c.y - sy).powi(2))
                .fold(f64::INFINITY, f64::min);
            if d > best_d {
                best = (c.x, c.y);
                best_d = d;
            }
        }
        seeds.push(best);
    }
    seeds
}

fn nearest(centers: &[(f64, f64)], x: f64, y: f64) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (j, &(cx, cy)) in centers.iter().enumerate() {
        let d = (x - cx).powi(2) + (y - cy).powi(2);
        if d < best_d {
            best = j;
            best_d = d;
        }
    }
    best
}

fn farthest_point(sorted: &[&Circle], assignment: &[usize], centers: &[(f64, f64)]) -> (f64, f64) {
    sorted
        .iter()
        .zip(assignment)
        .map(|(c, &a)| {
            let d = (c.x - centers[a].0).powi(2) + (c.y - centers[a].1).powi(2);
            (d, (c.x, c.y))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| p)
        .unwrap_or((0.0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(x: f64, y: f64, radius: f64) -> Vec<Circle> {
        [(-1.0, 0.5), (0.0, 0.0), (1.0, -0.5), (0.5, 1.0), (-0.5, -1.0)]
            .iter()
            .map(|&(dx, dy)| Circle { x: x + dx, y: y + dy, radius })
            .collect()
    }

    #[test]
    fn six_groups_come_back_sorted_by_x() {
        let mut circles = Vec::new();
        // Insert out of order on purpose.
        for (i, x) in [400.0, 100.0, 600.0, 300.0, 200.0, 500.0].iter().enumerate() {
            circles.extend(group(*x, 80.0 + i as f64, 20.0 + *x / 100.0));
        }
        let clusters = cluster_circles(&circles, 6, 30, 0.1).unwrap();
        assert_eq!(clusters.len(), 6);
        for (i, c) in clusters.iter().enumerate() {
            let expected_x = 100.0 * (i + 1) as f64;
            assert!((c.center.x - expected_x).abs() < 1e-9, "cluster {i} at {}", c.center.x);
            assert!((c.mean_radius - (20.0 + expected_x / 100.0)).abs() < 1e-9);
            assert_eq!(c.members, 5);
        }
    }

    #[test]
    fn clustering_is_deterministic() {
        let mut circles = group(50.0, 50.0, 10.0);
        circles.extend(group(150.0, 52.0, 12.0));
        let a = cluster_circles(&circles, 2, 30, 0.1).unwrap();
        let b = cluster_circles(&circles, 2, 30, 0.1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn too_few_points_fail() {
        let circles = group(10.0, 10.0, 5.0);
        assert!(matches!(
            cluster_circles(&circles, 6, 30, 0.1),
            Err(LocalizeError::Clustering(_))
        ));
    }

    #[test]
    fn zero_clusters_fail() {
        assert!(cluster_circles(&group(0.0, 0.0, 1.0), 0, 30, 0.1).is_err());
    }
}
