use rand::Rng;

/// Users and groups that never uploaded a picture get one of the hundred
/// stock avatars.
pub fn random_avatar() -> String {
    let idx = rand::rng().random_range(1..=100);
    format!("https://avatar.iran.liara.run/public/{idx}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_index_stays_in_catalog_range() {
        for _ in 0..200 {
            let url = random_avatar();
            let idx: u32 = url
                .strip_prefix("https://avatar.iran.liara.run/public/")
                .and_then(|rest| rest.strip_suffix(".png"))
                .unwrap()
                .parse()
                .unwrap();
            assert!((1..=100).contains(&idx));
        }
    }
}
