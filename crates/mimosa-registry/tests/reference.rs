use mimosa_registry::Reference;

#[test]
fn cache_tag_round_trips_through_display() {
    let reference = Reference::parse("registry.example.com/team/app:v1").unwrap();
    let cache_tag = reference.cache_tag("abc123").unwrap();
    assert_eq!(cache_tag.to_string(), "registry.example.com/team/app:mimosa-content-hash-abc123");
}

#[test]
fn default_docker_hub_registry_has_implicit_repo_prefix() {
    let reference = Reference::parse("alpine:3.19").unwrap();
    assert_eq!(reference.tag(), Some("3.19"));
}
