//! Dense normal-equation least squares shared by matching and steering.

/// Least-squares solution of `A x ≈ b` given the columns of `A`, with
/// Tikhonov damping on the normal-equation diagonal. `None` when the
/// damped system is still singular.
pub(crate) fn least_squares_columns(
    columns: &[Vec<f64>],
    rhs: &[f64],
    damping: f64,
) -> Option<Vec<f64>> {
    let n = columns.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let mut normal = vec![vec![0.0; n]; n];
    let mut moment = vec![0.0; n];
    for i in 0..n {
        for j in 0..n {
            normal[i][j] = dot(&columns[i], &columns[j]);
        }
        normal[i][i] += damping;
        moment[i] = dot(&columns[i], rhs);
    }
    solve_square(normal, moment)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Gaussian elimination with partial pivoting.
fn solve_square(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-300 || !a[pivot][col].is_finite() {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_solution_of_square_system() {
        let columns = vec![vec![2.0, 0.0], vec![1.0, 3.0]];
        let rhs = vec![5.0, 9.0];
        let x = least_squares_columns(&columns, &rhs, 0.0).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_singular_columns_without_damping() {
        let columns = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(least_squares_columns(&columns, &[1.0, 2.0], 0.0).is_none());
    }

    #[test]
    fn damping_regularizes_degenerate_columns() {
        let columns = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(least_squares_columns(&columns, &[1.0, 2.0], 1e-9).is_some());
    }
}
