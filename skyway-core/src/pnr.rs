use rand::Rng;

/// Upper-case alphanumerics without the look-alikes 0/O and 1/I.
pub const PNR_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const PNR_LENGTH: usize = 6;

pub fn generate_pnr() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    random_code(rng, PNR_LENGTH)
}

pub(crate) fn random_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| PNR_ALPHABET[rng.gen_range(0..PNR_ALPHABET.len())] as char)
        .collect()
}

pub fn is_valid_pnr(pnr: &str) -> bool {
    pnr.len() == PNR_LENGTH && pnr.bytes().all(|b| PNR_ALPHABET.contains(&b))
}
