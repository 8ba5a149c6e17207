pub use nalgebra::{DMatrix, DVector};

/// Row-wise log-sum-exp with max shift for stability
pub fn logsumexp_rows(eta_nk: &DMatrix<f32>) -> DVector<f32> {
    let mut ret = DVector::<f32>::zeros(eta_nk.nrows());
    for (ii, row) in eta_nk.row_iter().enumerate() {
        let maxval = row.max();
        let sumexp: f32 = row.iter().map(|&x| (x - maxval).exp()).sum();
        ret[ii] = maxval + sumexp.ln();
    }
    ret
}

/// Row-wise log-softmax: `eta[i,] - logsumexp(eta[i,])`
pub fn log_softmax_rows(eta_nk: &DMatrix<f32>) -> DMatrix<f32> {
    let lse_n = logsumexp_rows(eta_nk);
    let mut ret = eta_nk.clone();
    for (ii, mut row) in ret.row_iter_mut().enumerate() {
        row.add_scalar_mut(-lse_n[ii]);
    }
    ret
}

/// Row-wise softmax
pub fn softmax_rows(eta_nk: &DMatrix<f32>) -> DMatrix<f32> {
    log_softmax_rows(eta_nk).map(|x| x.exp())
}

/// One-hot encode labels into an n x k matrix
pub fn onehot(labels: &[usize], kk: usize) -> anyhow::Result<DMatrix<f32>> {
    let mut ret = DMatrix::<f32>::zeros(labels.len(), kk);
    for (ii, &label) in labels.iter().enumerate() {
        anyhow::ensure!(
            label < kk,
            "label {} out of range for {} classes",
            label,
            kk
        );
        ret[(ii, label)] = 1.0;
    }
    Ok(ret)
}

/// Column index of the largest element in each row
pub fn row_argmax(xx: &DMatrix<f32>) -> Vec<usize> {
    xx.row_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by(|aa, bb| {
                    aa.1.partial_cmp(bb.1).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(jj, _)| jj)
                .unwrap_or(0)
        })
        .collect()
}

/// Symmetrize a square matrix in place: `A <- (A + A') / 2`
pub fn symmetrize_inplace(aa: &mut DMatrix<f32>) {
    let at = aa.transpose();
    *aa += &at;
    *aa *= 0.5;
}

/// No NaN or infinite elements
pub fn all_finite(xx: &DMatrix<f32>) -> bool {
    xx.iter().all(|x| x.is_finite())
}

/// No NaN or infinite elements
pub fn all_finite_vec(xx: &DVector<f32>) -> bool {
    xx.iter().all(|x| x.is_finite())
}
