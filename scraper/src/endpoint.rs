use enum_iterator::{all, Sequence};
use serde::Serialize;
use serde_json::Value;

/// Payload kinds the SOC API serves, each with its own summary counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Sequence)]
pub enum EndpointKind {
    Courses,
    OpenSections,
}

impl EndpointKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Courses => "courses",
            Self::OpenSections => "openSections",
        }
    }

    /// Unknown names are not an error: they are fetched and stored without counts.
    pub fn from_name(name: &str) -> Option<Self> {
        all::<Self>().find(|kind| kind.name() == name)
    }

    pub fn summarize(self, payload: &Value) -> PayloadSummary {
        let entries = entries(self, payload);

        match self {
            Self::Courses => PayloadSummary::Courses {
                courses_count: entries.len(),
                sections_count: entries.iter().map(section_count).sum(),
            },
            Self::OpenSections => PayloadSummary::OpenSections {
                open_section_count: entries.len(),
            },
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Endpoint-specific fields merged into the snapshot metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PayloadSummary {
    Courses {
        courses_count: usize,
        sections_count: usize,
    },
    OpenSections {
        open_section_count: usize,
    },
}

/// Counts for `endpoint`, or `None` when the name is not a known kind.
pub fn summarize(endpoint: &str, payload: &Value) -> Option<PayloadSummary> {
    match EndpointKind::from_name(endpoint) {
        Some(kind) => Some(kind.summarize(payload)),
        None => {
            let known = all::<EndpointKind>()
                .map(EndpointKind::name)
                .collect::<Vec<_>>()
                .join(", ");
            log::warn!("no summary counts for endpoint {endpoint:?} (known: {known})");
            None
        }
    }
}

fn entries(kind: EndpointKind, payload: &Value) -> &[Value] {
    match payload.as_array() {
        Some(entries) => entries.as_slice(),
        None => {
            log::warn!("{kind} payload is not a list, counting it as empty");
            &[]
        }
    }
}

fn section_count(course: &Value) -> usize {
    course
        .get("sections")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}
