use kube::Resource;

/// Group/version/kind/plural of the kind a strategy is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl TypeDescriptor {
    pub fn of<K>(namespaced: bool) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
            namespaced,
        }
    }

    pub fn api_version(&self) -> String {
        match self.group.is_empty() {
            true => self.version.to_owned(),
            false => format!("{}/{}", self.group, self.version),
        }
    }

    /// Key the scheme dispatches requests on: `group/version/plural`.
    pub fn route(&self) -> String {
        route(&self.group, &self.version, &self.plural)
    }

    pub fn matches(&self, api_version: &str, kind: &str) -> bool {
        self.api_version() == api_version && self.kind == kind
    }
}

pub fn route(group: &str, version: &str, plural: &str) -> String {
    format!("{group}/{version}/{plural}")
}
