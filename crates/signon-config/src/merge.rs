//! Shallow table-over-table merging for layered config files.

/// Merge `overlay` into `base` in place: table keys present in `overlay`
/// replace or recurse into the matching key in `base`; anything `overlay`
/// doesn't mention is left untouched. Non-table values in `overlay`
/// simply replace the value in `base`.
pub fn merge_tables(base: &mut toml::Value, overlay: &toml::Value) {
    let (Some(base_table), Some(overlay_table)) = (base.as_table_mut(), overlay.as_table()) else {
        *base = overlay.clone();
        return;
    };

    for (key, overlay_value) in overlay_table {
        match base_table.get_mut(key) {
            Some(existing) => merge_tables(existing, overlay_value),
            None => {
                base_table.insert(key.clone(), overlay_value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_leaf_values() {
        let mut base: toml::Value = toml::from_str("[storage]\nsecure = true\nsize_mb = 64\n").unwrap();
        let overlay: toml::Value = toml::from_str("[storage]\nsize_mb = 128\n").unwrap();

        merge_tables(&mut base, &overlay);
        assert_eq!(base["storage"]["size_mb"].as_integer(), Some(128));
        assert_eq!(base["storage"]["secure"].as_bool(), Some(true));
    }

    #[test]
    fn overlay_without_a_table_does_not_touch_other_tables() {
        let mut base: toml::Value = toml::from_str(
            "[storage]\nsecure = true\n[daemon]\nsocket_path = \"/run/signond/signond.sock\"\n",
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str("[daemon]\nsocket_path = \"/tmp/signond.sock\"\n").unwrap();

        merge_tables(&mut base, &overlay);
        assert_eq!(base["storage"]["secure"].as_bool(), Some(true));
        assert_eq!(base["daemon"]["socket_path"].as_str(), Some("/tmp/signond.sock"));
    }
}
