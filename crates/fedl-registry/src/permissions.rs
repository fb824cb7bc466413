//! Permission lattice gating cross-organization access to assets and models.
//!
//! A [`Privilege`] is either public or restricted to an explicit set of
//! organizations. Merging two privileges yields what both sides allow, so a
//! model trained with a dataset and an algorithm can only be processed by
//! organizations allowed by both.

use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Privilege {
    pub public: bool,
    /// Empty for public privileges
    pub authorized_ids: BTreeSet<OrgId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub process: Privilege,
    pub download: Privilege,
}

/// Privilege as declared by a submitter, before the owner rule is applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivilegeInput {
    pub public: bool,
    #[serde(default)]
    pub authorized_ids: Vec<OrgId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsInput {
    pub process: PrivilegeInput,
    /// Defaults to the process privilege when omitted
    #[serde(default)]
    pub download: Option<PrivilegeInput>,
}

impl PrivilegeInput {
    pub fn public() -> Self {
        Self {
            public: true,
            authorized_ids: Vec::new(),
        }
    }

    pub fn restricted(ids: impl IntoIterator<Item = OrgId>) -> Self {
        Self {
            public: false,
            authorized_ids: ids.into_iter().collect(),
        }
    }
}

impl PermissionsInput {
    pub fn public() -> Self {
        Self {
            process: PrivilegeInput::public(),
            download: None,
        }
    }

    pub fn restricted(ids: impl IntoIterator<Item = OrgId>) -> Self {
        Self {
            process: PrivilegeInput::restricted(ids),
            download: None,
        }
    }
}

/// Build a privilege from submitter input.
///
/// A private privilege always authorizes its owner, even when the submitter
/// left the owner out of the list.
pub fn new_privilege(input: &PrivilegeInput, owner: &OrgId) -> Privilege {
    if input.public {
        return Privilege::public();
    }
    let mut authorized_ids: BTreeSet<OrgId> = input.authorized_ids.iter().cloned().collect();
    authorized_ids.insert(owner.clone());
    Privilege {
        public: false,
        authorized_ids,
    }
}

pub fn new_permissions(input: &PermissionsInput, owner: &OrgId) -> Permissions {
    let process = new_privilege(&input.process, owner);
    let download = match &input.download {
        Some(download) => new_privilege(download, owner),
        None => process.clone(),
    };
    Permissions { process, download }
}

/// True iff `requester` may process an asset owned by `owner`
pub fn can_process(permissions: &Permissions, owner: &OrgId, requester: &OrgId) -> bool {
    requester == owner || permissions.process.allows(requester)
}

/// True iff `requester` may download an asset owned by `owner`
pub fn can_download(permissions: &Permissions, owner: &OrgId, requester: &OrgId) -> bool {
    requester == owner || permissions.download.allows(requester)
}

/// Field-wise intersection of two permission sets
pub fn merge_permissions(x: &Permissions, y: &Permissions) -> Permissions {
    Permissions {
        process: x.process.merge(&y.process),
        download: x.download.merge(&y.download),
    }
}

impl Privilege {
    pub fn public() -> Self {
        Self {
            public: true,
            authorized_ids: BTreeSet::new(),
        }
    }

    /// Private privilege granted to `owner` alone
    pub fn private_to(owner: &OrgId) -> Self {
        Self {
            public: false,
            authorized_ids: BTreeSet::from([owner.clone()]),
        }
    }

    pub fn allows(&self, requester: &OrgId) -> bool {
        self.public || self.authorized_ids.contains(requester)
    }

    /// Intersection. The restricted side governs when only one side is public.
    pub fn merge(&self, other: &Privilege) -> Privilege {
        match (self.public, other.public) {
            (true, true) => Privilege {
                public: true,
                authorized_ids: self
                    .authorized_ids
                    .intersection(&other.authorized_ids)
                    .cloned()
                    .collect(),
            },
            (true, false) => other.clone(),
            (false, true) => self.clone(),
            (false, false) => Privilege {
                public: false,
                authorized_ids: self
                    .authorized_ids
                    .intersection(&other.authorized_ids)
                    .cloned()
                    .collect(),
            },
        }
    }
}

impl Permissions {
    pub fn public() -> Self {
        Self {
            process: Privilege::public(),
            download: Privilege::public(),
        }
    }

    /// Process and download restricted to `owner`
    pub fn private_to(owner: &OrgId) -> Self {
        Self {
            process: Privilege::private_to(owner),
            download: Privilege::private_to(owner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(id: &str) -> OrgId {
        OrgId::from(id)
    }

    #[test]
    fn test_private_privilege_always_includes_owner() {
        let privilege = new_privilege(&PrivilegeInput::restricted(vec![]), &org("orgA"));
        assert!(!privilege.public);
        assert_eq!(privilege.authorized_ids, BTreeSet::from([org("orgA")]));
    }

    #[test]
    fn test_owner_insertion_is_idempotent() {
        let input = PrivilegeInput::restricted(vec![org("orgA"), org("orgB"), org("orgA")]);
        let privilege = new_privilege(&input, &org("orgA"));
        assert_eq!(privilege.authorized_ids.len(), 2);
    }

    #[test]
    fn test_public_input_drops_listed_ids() {
        let input = PrivilegeInput {
            public: true,
            authorized_ids: vec![org("orgB")],
        };
        assert_eq!(new_privilege(&input, &org("orgA")), Privilege::public());
    }

    #[test]
    fn test_download_defaults_to_process() {
        let permissions = new_permissions(&PermissionsInput::restricted(vec![org("orgB")]), &org("orgA"));
        assert_eq!(permissions.process, permissions.download);
    }

    #[test]
    fn test_can_process() {
        let permissions = new_permissions(&PermissionsInput::restricted(vec![org("orgB")]), &org("orgA"));
        assert!(can_process(&permissions, &org("orgA"), &org("orgA")));
        assert!(can_process(&permissions, &org("orgA"), &org("orgB")));
        assert!(!can_process(&permissions, &org("orgA"), &org("orgC")));
        assert!(can_process(&Permissions::public(), &org("orgA"), &org("orgC")));
        // Owners keep access even when the stored set does not name them
        assert!(can_process(&Permissions::private_to(&org("orgB")), &org("orgA"), &org("orgA")));
    }

    #[test]
    fn test_can_download() {
        let input = PermissionsInput {
            process: PrivilegeInput::public(),
            download: Some(PrivilegeInput::restricted(vec![org("orgB")])),
        };
        let permissions = new_permissions(&input, &org("orgA"));
        assert!(can_download(&permissions, &org("orgA"), &org("orgA")));
        assert!(can_download(&permissions, &org("orgA"), &org("orgB")));
        assert!(!can_download(&permissions, &org("orgA"), &org("orgC")));
        assert!(can_process(&permissions, &org("orgA"), &org("orgC")));
        assert!(can_download(&Permissions::public(), &org("orgA"), &org("orgC")));

        // Without a download privilege, download follows process
        let permissions = new_permissions(&PermissionsInput::restricted(vec![org("orgB")]), &org("orgA"));
        assert_eq!(permissions.download, permissions.process);
        assert!(can_download(&permissions, &org("orgA"), &org("orgB")));
        assert!(!can_download(&permissions, &org("orgA"), &org("orgC")));
    }

    #[test]
    fn test_merge_public_with_restricted_keeps_restricted_set() {
        let restricted = Privilege::private_to(&org("orgA"));
        assert_eq!(Privilege::public().merge(&restricted), restricted);
        assert_eq!(restricted.merge(&Privilege::public()), restricted);
    }

    #[test]
    fn test_merge_restricted_intersects() {
        let a = new_privilege(&PrivilegeInput::restricted(vec![org("orgB")]), &org("orgA"));
        let b = new_privilege(&PrivilegeInput::restricted(vec![org("orgC")]), &org("orgB"));
        let merged = a.merge(&b);
        assert!(!merged.public);
        assert_eq!(merged.authorized_ids, BTreeSet::from([org("orgB")]));
    }

    #[test]
    fn test_permissions_serialize_camel_case() {
        let json = serde_json::to_string(&Permissions::private_to(&org("orgA"))).unwrap();
        assert!(json.contains(r#""authorizedIds":["orgA"]"#));
    }
}
