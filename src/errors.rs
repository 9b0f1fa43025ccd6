use error_chain::error_chain;

error_chain! {

    types {
        Error, ErrorKind, ResultExt, Result;
    }

    foreign_links {
        GoogleAPI(google_drive3::Error);
        Io(std::io::Error);
    }

    errors {
        MissingEnvironment(vars: Vec<String>) {
            description("environment variables missing")
            display("Environment variables missing: {}", vars.join(", "))
        }
        MalformedEntry(entry: String) {
            description("malformed environment entry")
            display("Malformed environment entry \"{}\": expected unicode KEY=VALUE", entry)
        }
        InvalidExpiry(value: String) {
            description("invalid token expiry")
            display("Unable to parse expiry date \"{}\"", value)
        }
        FileOpen(path: String) {
            description("could not open local file")
            display("Error while opening file \"{}\"", path)
        }
        Auth(message: String) {
            description("authentication failed")
            display("{}", message)
        }
        Root {
            description("could not obtain drive root")
            display("Error while obtaining drive root")
        }
        Upload(name: String) {
            description("upload failed")
            display("Unable to upload file \"{}\"", name)
        }
        ChecksumMismatch(name: String, local: String, remote: String) {
            description("uploaded content does not match local content")
            display("Checksum mismatch for \"{}\": local {}, drive {}", name, local, remote)
        }
        NotFound(name: String) {
            description("file not found")
            display("Unable to find files with name '{}'", name)
        }
        Download(id: String) {
            description("download failed")
            display("Unable to download file {}", id)
        }
        Delete(id: String) {
            description("delete failed")
            display("Unable to delete file {}", id)
        }
    }
}

/// Wraps `prev` with `message`; the result renders as `message`, a newline,
/// then the rendering of `prev`.
pub fn nest<E>(message: impl Into<String>, prev: E) -> Error
where
    E: std::error::Error + Send + 'static,
{
    Error::with_chain(prev, ErrorKind::Msg(message.into()))
}

/// Renders every message in the chain, outermost first, one per line.
pub fn render(err: &Error) -> String {
    err.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_messages_render_outermost_first() {
        let err = nest("foo", nest("bar", Error::from("baz")));
        assert_eq!(render(&err), "foo\nbar\nbaz");
    }

    #[test]
    fn root_error_renders_alone() {
        assert_eq!(render(&Error::from("baz")), "baz");
    }

    #[test]
    fn chain_err_nests_like_nest() {
        let result: Result<()> = Err(Error::from("disk on fire"))
            .chain_err(|| ErrorKind::FileOpen("notes.txt".to_string()));
        let err = result.unwrap_err();
        assert_eq!(render(&err), "Error while opening file \"notes.txt\"\ndisk on fire");
    }

    #[test]
    fn foreign_errors_keep_their_message() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = nest("Unable to read", io);
        assert_eq!(render(&err), "Unable to read\nno such file");
    }
}
