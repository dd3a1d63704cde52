//! Tests for resource lookups.

use super::*;
use rstest::{fixture, rstest};
use uuid::Uuid;

const TEN_GIB: u64 = 10 << 30;

fn template(name: &str, size: u64) -> Template {
    Template {
        id: Uuid::new_v4(),
        name: name.to_owned(),
        size: Some(size),
        default_user: None,
        password_enabled: None,
    }
}

fn instance_type(family: &str, size: &str) -> InstanceType {
    InstanceType {
        id: Uuid::new_v4(),
        family: family.to_owned(),
        size: size.to_owned(),
    }
}

#[fixture]
fn catalogue() -> Vec<Template> {
    vec![
        template("Linux Ubuntu 24.04 LTS 64-bit", 20 << 30),
        template("Linux Ubuntu 24.04 LTS 64-bit", TEN_GIB),
        template("Linux Debian 12 (Bookworm) 64-bit", TEN_GIB),
        template("Linux Rocky Linux 9 64-bit", TEN_GIB),
        template("Windows Server 2022", TEN_GIB),
    ]
}

#[fixture]
fn sizes() -> Vec<InstanceType> {
    vec![
        instance_type("standard", "small"),
        instance_type("standard", "medium"),
        instance_type("cpu", "small"),
        instance_type("memory", "large"),
    ]
}

#[rstest]
#[case("Linux Ubuntu 24.04 LTS 64-bit", Some("ubuntu-24.04"))]
#[case("Linux Debian 12 (Bookworm) 64-bit", Some("debian-12"))]
#[case("Linux Rocky Linux 9 64-bit", Some("rocky-linux-9"))]
#[case("Linux RedHat 9.2 64-bit", Some("redhat-9.2"))]
#[case("Linux Foo 7. bar", Some("foo-7"))]
#[case("Linux Ubuntu LTS", None)]
#[case("Windows Server 2022", None)]
fn short_name_follows_linux_family_version_convention(
    #[case] name: &str,
    #[case] expected: Option<&str>,
) {
    assert_eq!(template_short_name(name).as_deref(), expected);
}

#[rstest]
fn template_matches_short_name_among_ten_gib_templates(catalogue: Vec<Template>) {
    let found = find_template(&catalogue, "ubuntu-24.04").expect("short name matches");

    assert_eq!(found.size, Some(TEN_GIB));
    assert_eq!(found.name, "Linux Ubuntu 24.04 LTS 64-bit");
}

#[rstest]
fn template_matches_full_name_case_insensitively(catalogue: Vec<Template>) {
    let found =
        find_template(&catalogue, "linux debian 12 (bookworm) 64-bit").expect("full name matches");

    assert_eq!(found.name, "Linux Debian 12 (Bookworm) 64-bit");
}

#[rstest]
fn template_lookup_cites_requested_name(catalogue: Vec<Template>) {
    let err = find_template(&catalogue, "archlinux-2024").expect_err("no match");

    assert_eq!(
        err,
        DriverError::ResourceNotFound {
            kind: ResourceKind::Template,
            name: String::from("archlinux-2024"),
        }
    );
}

#[rstest]
fn templates_of_other_sizes_are_ignored() {
    let catalogue = vec![template("Linux Ubuntu 22.04 LTS 64-bit", 50 << 30)];

    assert!(find_template(&catalogue, "ubuntu-22.04").is_err());
}

#[rstest]
#[case("standard.small", "standard", "small")]
#[case("STANDARD.Medium", "standard", "medium")]
#[case("cpu.small", "cpu", "small")]
#[case("small", "standard", "small")]
#[case("large", "", "")]
fn instance_type_matches_composite_or_bare_size(
    sizes: Vec<InstanceType>,
    #[case] key: &str,
    #[case] family: &str,
    #[case] size: &str,
) {
    let result = find_instance_type(&sizes, key);

    if family.is_empty() {
        assert!(
            matches!(result, Err(DriverError::ResourceNotFound { kind: ResourceKind::InstanceType, .. })),
            "bare sizes only search the standard family: {result:?}"
        );
    } else {
        let found = result.expect("instance type matches");
        assert_eq!((found.family.as_str(), found.size.as_str()), (family, size));
    }
}

#[rstest]
fn instance_type_matches_by_id(sizes: Vec<InstanceType>) {
    let wanted = sizes.get(3).expect("fixture has four entries").clone();

    let found = find_instance_type(&sizes, &wanted.id.to_string()).expect("id matches");

    assert_eq!(found, &wanted);
}

#[rstest]
fn duplicate_instance_types_are_ambiguous() {
    let sizes = vec![
        instance_type("standard", "small"),
        instance_type("standard", "small"),
    ];

    let err = find_instance_type(&sizes, "small").expect_err("two matches");

    assert!(
        matches!(err, DriverError::AmbiguousResource { count: 2, .. }),
        "unexpected: {err}"
    );
}

#[rstest]
fn find_by_name_accepts_name_or_id() {
    let groups = vec![
        AntiAffinityGroup {
            id: Uuid::new_v4(),
            name: String::from("web"),
            description: None,
        },
        AntiAffinityGroup {
            id: Uuid::new_v4(),
            name: String::from("db"),
            description: None,
        },
    ];
    let db = groups.get(1).expect("fixture has two groups");

    assert_eq!(find_by_name(&groups, "db"), Some(db));
    assert_eq!(find_by_name(&groups, &db.id.to_string()), Some(db));
    assert_eq!(find_by_name(&groups, "cache"), None);
}
