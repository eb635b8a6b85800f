//! Parsing and composition for `smb://` URLs.
//!
//! The SMB URL format never progressed past an expired IETF draft, so
//! several real clients disagree on edge cases; this parser favors the
//! forgiving behavior of the reference implementation it's grounded on:
//! a stray `?`, `&`, or `;` around the context string is tolerated, and
//! a URL fragment is reported as a warning rather than rejected.

use thiserror::Error;

/// A non-fatal condition noticed while parsing a URL that otherwise
/// parsed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlWarning {
    /// The URL carried a `#fragment`, which has no meaning in the SMB
    /// URL format and was discarded.
    FragmentIgnored { fragment: String },
}

/// A hard parse failure: the input does not match the SMB URL grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmbUrlError {
    #[error("missing initial double slash ('//')")]
    MissingDoubleSlash,

    #[error("invalid scheme '{0}'")]
    InvalidScheme(String),

    #[error("path provided, but no hostname given")]
    PathWithoutHostname,

    #[error("invalid port number '{0}'")]
    InvalidPort(String),
}

pub type SmbUrlResult<T> = Result<T, SmbUrlError>;

/// The decomposed fields of an `smb://` URL.
///
/// `scheme` is always `"smb"` and is not stored; [`SmbUrl::scheme`]
/// returns it as a constant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmbUrl {
    pub authdomain: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    /// Ordered key/value pairs from the `?context` portion of the URL.
    pub context: Vec<(String, String)>,
}

impl SmbUrl {
    pub fn scheme(&self) -> &'static str {
        "smb"
    }

    /// Parse an SMB URL. `None`/empty input is equivalent to `"smb://"`,
    /// representing a local Browse Service query, and parses to an
    /// entirely empty URL with no warnings.
    pub fn parse(url: &str) -> SmbUrlResult<(Self, Vec<UrlWarning>)> {
        if url.is_empty() {
            return Ok((Self::default(), Vec::new()));
        }

        let tmp = url.trim_start();

        let (scheme, rest) = match tmp.split_once("//") {
            Some((scheme, rest)) => (scheme, rest),
            None => return Err(SmbUrlError::MissingDoubleSlash),
        };
        if !scheme.is_empty() {
            let bare = scheme.trim_end_matches(':');
            if !bare.eq_ignore_ascii_case("smb") {
                return Err(SmbUrlError::InvalidScheme(scheme.to_string()));
            }
        }

        let (rest, fragment) = match rest.split_once('#') {
            Some((before, frag)) => (before, Some(frag.to_string())),
            None => (rest, None),
        };
        let (rest, context) = match rest.split_once('?') {
            Some((before, ctx)) => (before, Some(ctx)),
            None => (rest, None),
        };
        let (netloc, path) = match rest.split_once('/') {
            Some((netloc, path)) => (netloc, Some(path)),
            None => (rest, None),
        };

        let (username_part, hostname) = match netloc.rsplit_once('@') {
            Some((u, h)) => (u, h),
            None => ("", netloc),
        };
        let (authdomain, username_part) = match username_part.rsplit_once(';') {
            Some((ad, un)) => (Some(ad), un),
            None => (None, username_part),
        };
        let (username, password) = match username_part.split_once(':') {
            Some((u, p)) => (Some(u), Some(p)),
            None => (if username_part.is_empty() { None } else { Some(username_part) }, None),
        };
        let (hostname, port) = match hostname.split_once(':') {
            Some((h, p)) => (h, Some(p)),
            None => (hostname, None),
        };

        if path.is_some() && hostname.is_empty() {
            return Err(SmbUrlError::PathWithoutHostname);
        }

        let port = match port {
            None | Some("") => None,
            Some(p) => Some(
                p.parse::<u16>()
                    .map_err(|_| SmbUrlError::InvalidPort(p.to_string()))?,
            ),
        };

        let result = Self {
            authdomain: clean(authdomain),
            username: clean(username),
            password: clean(password),
            hostname: clean(Some(hostname)),
            port,
            path: path.map(|p| format!("/{}", p.trim_start_matches('/'))).filter(|p| p != "/"),
            context: parse_context(context.unwrap_or("")),
        };

        let mut warnings = Vec::new();
        if let Some(fragment) = fragment {
            log::warn!(target: "smb_url", "URL fragment ignored: {fragment}");
            warnings.push(UrlWarning::FragmentIgnored { fragment });
        }

        Ok((result, warnings))
    }

    /// Compose the canonical URL string, using `;` between context pairs.
    pub fn compose(&self) -> SmbUrlResult<String> {
        if self.path.is_some() && self.hostname.is_none() {
            return Err(SmbUrlError::PathWithoutHostname);
        }
        let ad = self.authdomain.as_deref().map(|a| format!("{a};")).unwrap_or_default();
        let pw = self.password.as_deref().map(|p| format!(":{p}")).unwrap_or_default();
        let un = self
            .username
            .as_deref()
            .map(|u| format!("{u}{pw}@"))
            .unwrap_or_default();
        let hn = self.hostname.as_deref().unwrap_or("");
        let po = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let pa = self.path.as_deref().unwrap_or("");
        let cx = compose_context(&self.context)
            .map(|c| format!("?{c}"))
            .unwrap_or_default();
        Ok(format!("smb://{ad}{un}{hn}{po}{pa}{cx}"))
    }
}

fn clean(field: Option<&str>) -> Option<String> {
    match field {
        Some(s) if !s.is_empty() => Some(s.to_string()),
        _ => None,
    }
}

/// Parse an SMB URL's `?context` string into ordered key/value pairs.
/// Tolerant of stray leading/trailing `?`, `&`, `;` and surrounding
/// whitespace around keys.
pub fn parse_context(context: &str) -> Vec<(String, String)> {
    let trimmed = context.trim_start_matches([' ', '?', '&', ';']).trim_end_matches(['&', ';']);
    if trimmed.is_empty() {
        return Vec::new();
    }
    let mut pairs = Vec::new();
    for segment in trimmed.split(';') {
        for pair in segment.split('&') {
            if pair.trim().is_empty() {
                continue;
            }
            if let Some((key, value)) = pair.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    pairs.push((key.to_string(), value.to_string()));
                }
            }
        }
    }
    pairs
}

/// Compose context key/value pairs into a `;`-separated string, or
/// `None` if the list is empty.
pub fn compose_context(pairs: &[(String, String)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(";"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_url_with_credentials_and_path() {
        let (url, warnings) = SmbUrl::parse("smb://ad;un:pw@host/share/path/file.ext").unwrap();
        assert!(warnings.is_empty());
        assert_eq!(url.authdomain.as_deref(), Some("ad"));
        assert_eq!(url.username.as_deref(), Some("un"));
        assert_eq!(url.password.as_deref(), Some("pw"));
        assert_eq!(url.hostname.as_deref(), Some("host"));
        assert_eq!(url.path.as_deref(), Some("/share/path/file.ext"));
    }

    #[test]
    fn empty_input_is_equivalent_to_bare_scheme() {
        let (url, warnings) = SmbUrl::parse("").unwrap();
        assert_eq!(url, SmbUrl::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn fragment_produces_a_warning_not_an_error() {
        let (_, warnings) = SmbUrl::parse("smb://#NoGood").unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], UrlWarning::FragmentIgnored { fragment } if fragment == "NoGood"));
    }

    #[test]
    fn path_without_hostname_is_a_syntax_error() {
        assert_eq!(SmbUrl::parse("smb:///share"), Err(SmbUrlError::PathWithoutHostname));
    }

    #[test]
    fn missing_double_slash_is_rejected() {
        assert_eq!(SmbUrl::parse("smb:host/share"), Err(SmbUrlError::MissingDoubleSlash));
    }

    #[test]
    fn context_parses_forgivingly_and_round_trips() {
        let pairs = parse_context("? a=1;&b=2; c =3; &");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
        assert_eq!(compose_context(&pairs).as_deref(), Some("a=1;b=2;c=3"));
        assert_eq!(compose_context(&[]), None);
    }

    #[test]
    fn compose_round_trips_a_parsed_url() {
        let (url, _) = SmbUrl::parse("smb://chesspieceface@fooberry/hamster?calling=me;called=you").unwrap();
        assert_eq!(url.compose().unwrap(), "smb://chesspieceface@fooberry/hamster?calling=me;called=you");
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(matches!(SmbUrl::parse("smb://host:notaport/"), Err(SmbUrlError::InvalidPort(_))));
    }
}
