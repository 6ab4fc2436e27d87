use colored::*;

/// Tagged stderr logging, grounded on `passerine-aspen/src/status.rs`
/// — one category per severity rather than a generic `log::Level`,
/// since this CLI only ever reports a handful of distinct situations.
pub enum Kind {
    Info,
    Success,
    Fatal,
}

pub struct Status(pub Kind, pub &'static str);

impl Status {
    pub fn info() -> Status {
        Status(Kind::Info, "Info")
    }

    pub fn success() -> Status {
        Status(Kind::Success, "Success")
    }

    pub fn fatal() -> Status {
        Status(Kind::Fatal, "Fatal")
    }

    fn tag(&self) -> ColoredString {
        match self.0 {
            Kind::Info => self.1.blue(),
            Kind::Success => self.1.green(),
            Kind::Fatal => self.1.red(),
        }
        .bold()
    }

    pub fn log(&self, message: &str) {
        eprintln!("{:>8} {}", self.tag(), message);
    }
}
