use freeze_drip_lib::config::{encode, EncodeError, Profile, ProfileError, ProfileField};

fn is_wire_format(command: &str) -> bool {
    let Some(body) = command.strip_prefix('#').and_then(|c| c.strip_suffix('$')) else {
        return false;
    };
    let parts: Vec<&str> = body.split(',').collect();
    parts.len() % 2 == 0
        && parts.chunks(2).all(|pair| {
            let (tag, value) = (pair[0], pair[1]);
            !tag.is_empty()
                && tag.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
                && (2..=4).contains(&value.len())
                && value.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
        })
}

#[test]
fn test_encode_reference_profile() {
    let profile = Profile::factory_default();
    assert_eq!(
        encode(&profile).unwrap(),
        "#B,60,RBV,FF,CBV,FF,S,05,H,3C,T,0A,U,14,L,000A,D,003C,T1,0190,T2,0172,T3,0140,S1,001E,S2,003C,S3,003C,S4,001E$"
    );
}

#[test]
fn test_encode_range_extremes_match_wire_format() {
    let mut low = Profile::default();
    let mut high = Profile::default();
    for field in ProfileField::ALL {
        let (min, max) = field.range();
        low.set(field, min.to_string());
        high.set(field, max.to_string());
    }
    assert!(low.is_valid());
    assert!(high.is_valid());

    let low_command = encode(&low).unwrap();
    let high_command = encode(&high).unwrap();
    assert!(is_wire_format(&low_command), "{}", low_command);
    assert!(is_wire_format(&high_command), "{}", high_command);
    assert!(high_command.contains("T,1E,"), "{}", high_command);
    assert!(high_command.contains("D,0258,"), "{}", high_command);
    assert!(low_command.contains("T,01,"), "{}", low_command);
}

#[test]
fn test_encode_is_deterministic() {
    let profile = Profile::factory_default();
    assert_eq!(encode(&profile), encode(&profile));
}

#[test]
fn test_encode_rejects_non_numeric() {
    let mut profile = Profile::factory_default();
    profile.set(ProfileField::HeartbeatInterval, "sixty");
    assert_eq!(
        encode(&profile),
        Err(EncodeError::Profile(ProfileError::NotInteger {
            field: ProfileField::HeartbeatInterval,
            value: "sixty".to_string(),
        }))
    );
}

#[test]
fn test_encode_ignores_identity() {
    let mut named = Profile::factory_default();
    named.id = Some(7);
    named.name = Some("Barn".to_string());
    assert_eq!(encode(&named), encode(&Profile::factory_default()));
}
