use super::*;

struct Failing;
impl DynamicRangeSource for Failing {
    fn headroom(&self) -> FramecastResult<f32> {
        Err(FramecastError::headroom("display gone"))
    }
}

#[test]
fn failing_source_yields_exactly_neutral() {
    let probe = DynamicRangeProbe::new(Box::new(Failing));
    assert_eq!(probe.current_headroom(), 1.0);
    assert_eq!(probe.current_headroom(), 1.0);
    assert_eq!(probe.fallback_count(), 2);
}

#[test]
fn invalid_values_fall_back_to_neutral() {
    for bad in [0.5f32, 0.0, -3.0, f32::NAN, f32::INFINITY] {
        let probe = DynamicRangeProbe::new(Box::new(FixedHeadroom(bad)));
        assert_eq!(probe.current_headroom(), NEUTRAL_HEADROOM, "value {bad}");
    }
}

#[test]
fn valid_values_pass_through() {
    let probe = DynamicRangeProbe::new(Box::new(FixedHeadroom(2.5)));
    assert_eq!(probe.current_headroom(), 2.5);
    assert_eq!(probe.fallback_count(), 0);

    let probe = DynamicRangeProbe::new(Box::new(StandardRange));
    assert_eq!(probe.current_headroom(), 1.0);
}

#[test]
fn shared_source_is_requeried_every_frame() {
    let shared = SharedHeadroom::unavailable();
    let probe = DynamicRangeProbe::new(Box::new(shared.clone()));
    assert_eq!(probe.current_headroom(), 1.0);

    shared.set(4.0);
    assert_eq!(probe.current_headroom(), 4.0);

    shared.set(1.6);
    assert_eq!(probe.current_headroom(), 1.6);

    shared.clear();
    assert_eq!(probe.current_headroom(), 1.0);
}

#[test]
fn unset_env_var_is_unavailable() {
    let src = EnvHeadroom::new("FRAMECAST_TEST_HEADROOM_THAT_IS_NEVER_SET");
    let err = src.headroom().unwrap_err();
    assert!(err.to_string().contains("headroom query failed"));

    let probe = DynamicRangeProbe::new(Box::new(src));
    assert_eq!(probe.current_headroom(), 1.0);
}

#[test]
fn source_kind_serde_shape() {
    let k: HeadroomSourceKind =
        serde_json::from_str(r#"{"kind":"fixed","value":3.0}"#).unwrap();
    assert_eq!(k, HeadroomSourceKind::Fixed(3.0));
    let k: HeadroomSourceKind = serde_json::from_str(r#"{"kind":"standard"}"#).unwrap();
    assert_eq!(k, HeadroomSourceKind::Standard);

    let probe = DynamicRangeProbe::new(HeadroomSourceKind::Fixed(3.0).build());
    assert_eq!(probe.current_headroom(), 3.0);
}
