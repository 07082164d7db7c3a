//! Messages of the transfer protocol
//!
//! A conversation opens with a service request from the client:
//!
//! ```text
//! bit-upload-pack <path>\0[auth=<credentials>\0]
//! bit-receive-pack <path>\0[auth=<credentials>\0]
//! ```
//!
//! The server answers with its ref advertisement, one `<oid> <ref>` line per
//! ref, HEAD first when it resolves. The first line carries the capability
//! list after a NUL; `symref=HEAD:<ref>` names the checked-out branch. A
//! repository without refs advertises `<zero-id> capabilities^{}` instead.
//!
//! Fetching continues with `want <oid>` lines, a flush, `have <oid>` lines
//! and `done`; the server acknowledges common commits (`ACK <oid>` or `NAK`)
//! and streams the pack. Pushing sends `<old> <new> <ref>` commands, a flush
//! and the pack; the server reports `unpack ok` and `ok <ref>` or
//! `ng <ref> <reason>` per command.

use crate::artifacts::branch::HEAD_REF_NAME;
use crate::artifacts::core::errors::BitError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::credentials::Credentials;
use std::collections::BTreeMap;
use std::fmt;

const CAPABILITIES_PLACEHOLDER: &str = "capabilities^{}";
const SYMREF_CAPABILITY: &str = "symref=HEAD:";
const AUTH_FIELD: &str = "auth=";

fn malformed(what: &str, line: &str) -> anyhow::Error {
    BitError::TransportFailure(format!("malformed {what}: '{line}'")).into()
}

fn parse_oid(what: &str, line: &str, oid: &str) -> anyhow::Result<ObjectId> {
    ObjectId::try_parse(oid.to_string()).map_err(|_| malformed(what, line))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    UploadPack,
    ReceivePack,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::UploadPack => "bit-upload-pack",
            Service::ReceivePack => "bit-receive-pack",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub service: Service,
    /// Repository path as the client named it, relative to the daemon root
    pub path: String,
    pub credentials: Credentials,
}

impl ServiceRequest {
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let mut request = format!("{} {}\0", self.service, self.path);
        if let Some(field) = self.credentials.to_request_field()? {
            request.push_str(&format!("{AUTH_FIELD}{field}\0"));
        }
        Ok(request.into_bytes())
    }

    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| BitError::TransportFailure("service request is not UTF-8".to_string()))?;
        let mut fields = text.split('\0');

        let command = fields.next().unwrap_or_default();
        let (service, path) = command
            .split_once(' ')
            .ok_or_else(|| malformed("service request", command))?;
        let service = match service {
            "bit-upload-pack" => Service::UploadPack,
            "bit-receive-pack" => Service::ReceivePack,
            _ => {
                return Err(BitError::TransportFailure(format!("unknown service '{service}'")).into());
            }
        };

        let credentials = fields
            .filter_map(|field| field.strip_prefix(AUTH_FIELD))
            .find_map(Credentials::from_request_field)
            .unwrap_or_default();

        Ok(Self {
            service,
            path: path.to_string(),
            credentials,
        })
    }
}

/// Refs a server offers, as seen by the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefAdvertisement {
    /// Full ref names under `refs/`
    pub refs: BTreeMap<String, ObjectId>,
    /// Commit HEAD resolves to, if the current branch is born
    pub head: Option<ObjectId>,
    /// Branch HEAD points at, e.g. `refs/heads/main`
    pub head_target: Option<String>,
}

impl RefAdvertisement {
    pub fn encode(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(head) = &self.head {
            lines.push(format!("{head} {HEAD_REF_NAME}"));
        }
        lines.extend(self.refs.iter().map(|(name, oid)| format!("{oid} {name}")));
        if lines.is_empty() {
            lines.push(format!("{} {CAPABILITIES_PLACEHOLDER}", ObjectId::zero()));
        }

        if let Some(target) = &self.head_target {
            lines[0].push_str(&format!("\0{SYMREF_CAPABILITY}{target}"));
        }

        lines
    }

    pub fn parse(lines: &[String]) -> anyhow::Result<Self> {
        let mut advertisement = Self::default();

        for line in lines {
            let (line, capabilities) = line.split_once('\0').unwrap_or((line, ""));
            if let Some(target) = capabilities
                .split(' ')
                .find_map(|capability| capability.strip_prefix(SYMREF_CAPABILITY))
            {
                advertisement.head_target = Some(target.to_string());
            }

            let (oid, name) = line
                .split_once(' ')
                .ok_or_else(|| malformed("ref advertisement", line))?;
            match name {
                CAPABILITIES_PLACEHOLDER => {}
                HEAD_REF_NAME => advertisement.head = Some(parse_oid("ref advertisement", line, oid)?),
                _ => {
                    let oid = parse_oid("ref advertisement", line, oid)?;
                    advertisement.refs.insert(name.to_string(), oid);
                }
            }
        }

        Ok(advertisement)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    Want(ObjectId),
    Have(ObjectId),
    Done,
}

impl Negotiation {
    pub fn encode(&self) -> String {
        match self {
            Negotiation::Want(oid) => format!("want {oid}"),
            Negotiation::Have(oid) => format!("have {oid}"),
            Negotiation::Done => "done".to_string(),
        }
    }

    pub fn parse(line: &str) -> anyhow::Result<Self> {
        if line == "done" {
            return Ok(Negotiation::Done);
        }
        match line.split_once(' ') {
            Some(("want", oid)) => Ok(Negotiation::Want(parse_oid("want", line, oid)?)),
            Some(("have", oid)) => Ok(Negotiation::Have(parse_oid("have", line, oid)?)),
            _ => Err(malformed("negotiation line", line)),
        }
    }
}

/// One ref update requested by a push; a zero id stands for "absent"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub old: ObjectId,
    pub new: ObjectId,
    pub name: String,
}

impl Command {
    pub fn is_delete(&self) -> bool {
        self.new.is_zero()
    }

    pub fn is_create(&self) -> bool {
        self.old.is_zero()
    }

    pub fn encode(&self) -> String {
        format!("{} {} {}", self.old, self.new, self.name)
    }

    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let mut parts = line.splitn(3, ' ');
        let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed("push command", line));
        };

        Ok(Self {
            old: parse_oid("push command", line, old)?,
            new: parse_oid("push command", line, new)?,
            name: name.to_string(),
        })
    }
}

/// Outcome of one push command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Ok(String),
    Rejected { name: String, reason: String },
}

impl CommandStatus {
    pub fn encode(&self) -> String {
        match self {
            CommandStatus::Ok(name) => format!("ok {name}"),
            CommandStatus::Rejected { name, reason } => format!("ng {name} {reason}"),
        }
    }

    pub fn parse(line: &str) -> anyhow::Result<Self> {
        match line.split_once(' ') {
            Some(("ok", name)) => Ok(CommandStatus::Ok(name.to_string())),
            Some(("ng", rest)) => {
                let (name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
                Ok(CommandStatus::Rejected {
                    name: name.to_string(),
                    reason: reason.to_string(),
                })
            }
            _ => Err(malformed("command status", line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn oid(digit: char) -> ObjectId {
        ObjectId::try_parse(digit.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn advertisements_carry_the_head_symref() {
        let advertisement = RefAdvertisement {
            refs: BTreeMap::from([
                ("refs/heads/main".to_string(), oid('a')),
                ("refs/tags/v1".to_string(), oid('b')),
            ]),
            head: Some(oid('a')),
            head_target: Some("refs/heads/main".to_string()),
        };

        let lines = advertisement.encode();
        assert_eq!(
            lines[0],
            format!("{} HEAD\0symref=HEAD:refs/heads/main", oid('a'))
        );
        assert_eq!(RefAdvertisement::parse(&lines).unwrap(), advertisement);
    }

    #[test]
    fn empty_repositories_advertise_capabilities_only() {
        let advertisement = RefAdvertisement {
            head_target: Some("refs/heads/master".to_string()),
            ..Default::default()
        };

        let lines = advertisement.encode();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("capabilities^{}"));
        assert_eq!(RefAdvertisement::parse(&lines).unwrap(), advertisement);
    }

    #[test]
    fn service_requests_keep_credentials() {
        let request = ServiceRequest {
            service: Service::ReceivePack,
            path: "team/project".to_string(),
            credentials: Credentials::Token("t0k3n".to_string()),
        };

        let parsed = ServiceRequest::parse(&request.encode().unwrap()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn commands_parse_with_spaces_free_names() {
        let command = Command::parse(&format!("{} {} refs/heads/main", ObjectId::zero(), oid('c')))
            .unwrap();

        assert!(command.is_create());
        assert!(!command.is_delete());
        assert_eq!(command.name, "refs/heads/main");
    }

    #[rstest]
    #[case("ok refs/heads/main", CommandStatus::Ok("refs/heads/main".into()))]
    #[case(
        "ng refs/heads/main stale info",
        CommandStatus::Rejected { name: "refs/heads/main".into(), reason: "stale info".into() }
    )]
    fn statuses_parse(#[case] line: &str, #[case] expected: CommandStatus) {
        assert_eq!(CommandStatus::parse(line).unwrap(), expected);
        assert_eq!(expected.encode(), line);
    }

    #[rstest]
    #[case("want 1234")]
    #[case("fetch everything")]
    #[case("have")]
    fn bad_negotiation_lines_are_rejected(#[case] line: &str) {
        assert!(Negotiation::parse(line).is_err());
    }
}
