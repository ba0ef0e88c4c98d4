#![forbid(unsafe_code)]

/// What the installed engine supports, derived from its version banner.
///
/// A snapshot is built fresh by [`Capabilities::parse`] and never mutated
/// afterwards; re-probing replaces the whole value. The banner's first
/// line must end with a dotted version number; lines after the
/// "Supported specifications" marker are `Label: Value` pairs for the
/// formats the engine understands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    baseline: bool,
    progress_reporting: bool,
    online_remediation: bool,
    source_datastreams: bool,
    arf_input: bool,
    tailoring: bool,
    script_check_engine: bool,
    engine_version: Option<String>,
    xccdf_version: Option<String>,
    oval_version: Option<String>,
    cpe_version: Option<String>,
}

impl Capabilities {
    /// Parse a version banner into a capability snapshot.
    ///
    /// An unrecognizable first line yields an all-unsupported snapshot,
    /// which prerequisite checks then reject as an unusable engine.
    pub fn parse(banner: &str) -> Self {
        let mut caps = Capabilities::default();

        let Some(version) = banner.lines().next().and_then(parse_dotted_version) else {
            return caps;
        };

        caps.engine_version = Some(format!(
            "{}.{}.{}",
            version.0, version.1, version.2
        ));
        caps.baseline = version >= (0, 8, 0);
        caps.source_datastreams = version >= (0, 9, 0);
        caps.progress_reporting = version >= (0, 9, 3);
        caps.arf_input = version >= (0, 9, 3);
        caps.online_remediation = version >= (0, 9, 5);
        caps.tailoring = version >= (0, 9, 12);

        let mut in_specifications = false;
        for line in banner.lines().skip(1) {
            if line.contains("script-check-engine") {
                caps.script_check_engine = true;
            }
            if line.contains("Supported specifications") {
                in_specifications = true;
                continue;
            }
            if !in_specifications {
                continue;
            }
            let Some((label, value)) = line.split_once(':') else {
                // End of the label/value block.
                in_specifications = false;
                continue;
            };
            let value = value.trim().to_string();
            if label.contains("XCCDF") {
                caps.xccdf_version = Some(value);
            } else if label.contains("OVAL") {
                caps.oval_version = Some(value);
            } else if label.contains("CPE") {
                caps.cpe_version = Some(value);
            }
        }

        caps
    }

    /// Snapshot assumed for command-line previews before any probe has
    /// run: a current engine with everything supported.
    pub fn assumed() -> Self {
        Self {
            baseline: true,
            progress_reporting: true,
            online_remediation: true,
            source_datastreams: true,
            arf_input: true,
            tailoring: true,
            script_check_engine: false,
            engine_version: None,
            xccdf_version: None,
            oval_version: None,
            cpe_version: None,
        }
    }

    /// Whether the engine is usable at all.
    pub fn baseline(&self) -> bool {
        self.baseline
    }

    pub fn progress_reporting(&self) -> bool {
        self.progress_reporting
    }

    pub fn online_remediation(&self) -> bool {
        self.online_remediation
    }

    pub fn source_datastreams(&self) -> bool {
        self.source_datastreams
    }

    /// Whether a result bundle can be fed back in for offline remediation.
    pub fn arf_input(&self) -> bool {
        self.arf_input
    }

    pub fn tailoring(&self) -> bool {
        self.tailoring
    }

    pub fn script_check_engine(&self) -> bool {
        self.script_check_engine
    }

    pub fn engine_version(&self) -> Option<&str> {
        self.engine_version.as_deref()
    }

    pub fn xccdf_version(&self) -> Option<&str> {
        self.xccdf_version.as_deref()
    }

    pub fn oval_version(&self) -> Option<&str> {
        self.oval_version.as_deref()
    }

    pub fn cpe_version(&self) -> Option<&str> {
        self.cpe_version.as_deref()
    }
}

/// Extract `major.minor[.patch]` from the end of the banner's first line.
fn parse_dotted_version(line: &str) -> Option<(u32, u32, u32)> {
    let token = line.split_whitespace().last()?;
    let mut parts = token.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(part) => part.parse().ok()?,
        None => 0,
    };
    Some((major, minor, patch))
}
