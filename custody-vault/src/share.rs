//! N-of-N XOR secret splitting across custody nodes.
//!
//! Every share is as long as the secret. Any strict subset of shares is
//! uniformly random; all of them XOR back to the secret.

use rand_core::{OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CustodyError;

pub fn split(secret: &[u8], nodes: usize) -> Result<Vec<Zeroizing<Vec<u8>>>, CustodyError> {
    if nodes == 0 {
        return Err(CustodyError::Backend("cannot split across zero nodes".into()));
    }

    let mut last = Zeroizing::new(secret.to_vec());
    let mut shares = Vec::with_capacity(nodes);
    for _ in 1..nodes {
        let mut pad = Zeroizing::new(vec![0u8; secret.len()]);
        OsRng.fill_bytes(&mut pad);
        xor_into(&mut last, &pad);
        shares.push(pad);
    }
    shares.push(last);
    Ok(shares)
}

pub fn combine(shares: &[Zeroizing<Vec<u8>>]) -> Result<Zeroizing<Vec<u8>>, CustodyError> {
    let first = shares
        .first()
        .ok_or_else(|| CustodyError::Backend("no shares to combine".into()))?;
    let mut secret = Zeroizing::new(first.to_vec());
    for share in &shares[1..] {
        if share.len() != secret.len() {
            return Err(CustodyError::Backend("share length mismatch".into()));
        }
        xor_into(&mut secret, share);
    }
    Ok(secret)
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}
