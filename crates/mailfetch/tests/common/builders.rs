//! Builders for raw messages and PDF fixtures.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const BOUNDARY: &str = "----=_Part_0_mailfetch";

enum Attachment {
    File {
        filename: String,
        content_type: String,
        charset: Option<String>,
        data: Vec<u8>,
    },
    /// A whole message carried as message/rfc822.
    Message(Vec<u8>),
}

/// Builds RFC 5322 messages. Header values are written verbatim, so encoded
/// words can be passed in as-is.
pub struct MessageBuilder {
    subject: Option<String>,
    from: String,
    to: String,
    date: String,
    body: String,
    charset: String,
    boundary: String,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            subject: None,
            from: "Billing <billing@example.com>".to_string(),
            to: "me@example.com".to_string(),
            date: "Tue, 14 May 2024 09:30:00 +0800".to_string(),
            body: String::new(),
            charset: "utf-8".to_string(),
            boundary: BOUNDARY.to_string(),
            attachments: Vec::new(),
        }
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn from(mut self, from: &str) -> Self {
        self.from = from.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Multipart boundary; nested messages need one of their own.
    pub fn boundary(mut self, boundary: &str) -> Self {
        self.boundary = boundary.to_string();
        self
    }

    pub fn attachment(mut self, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.attachments.push(Attachment::File {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            charset: None,
            data: data.to_vec(),
        });
        self
    }

    /// Text attachment whose bytes are in `charset`.
    pub fn text_attachment(
        mut self,
        filename: &str,
        content_type: &str,
        charset: &str,
        data: &[u8],
    ) -> Self {
        self.attachments.push(Attachment::File {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            charset: Some(charset.to_string()),
            data: data.to_vec(),
        });
        self
    }

    /// Forwards `message` as a message/rfc822 part.
    pub fn forward(mut self, message: Vec<u8>) -> Self {
        self.attachments.push(Attachment::Message(message));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = String::new();
        if let Some(subject) = &self.subject {
            out.push_str(&format!("Subject: {}\r\n", subject));
        }
        out.push_str(&format!("From: {}\r\n", self.from));
        out.push_str(&format!("To: {}\r\n", self.to));
        out.push_str(&format!("Date: {}\r\n", self.date));
        out.push_str("MIME-Version: 1.0\r\n");

        if self.attachments.is_empty() {
            out.push_str(&format!(
                "Content-Type: text/plain; charset={}\r\n\r\n{}\r\n",
                self.charset, self.body
            ));
            return out.into_bytes();
        }

        let boundary = &self.boundary;
        out.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            boundary
        ));
        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str(&format!(
            "Content-Type: text/plain; charset={}\r\n\r\n{}\r\n",
            self.charset, self.body
        ));

        for attachment in &self.attachments {
            out.push_str(&format!("--{}\r\n", boundary));
            match attachment {
                Attachment::File {
                    filename,
                    content_type,
                    charset,
                    data,
                } => {
                    let charset = charset
                        .as_ref()
                        .map(|c| format!("; charset={}", c))
                        .unwrap_or_default();
                    out.push_str(&format!(
                        "Content-Type: {}{}; name=\"{}\"\r\n",
                        content_type, charset, filename
                    ));
                    out.push_str(&format!(
                        "Content-Disposition: attachment; filename=\"{}\"\r\n",
                        filename
                    ));
                    out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
                    out.push_str(&wrap_base64(data));
                }
                Attachment::Message(message) => {
                    out.push_str("Content-Type: message/rfc822\r\n\r\n");
                    out.push_str(&String::from_utf8_lossy(message));
                    out.push_str("\r\n");
                }
            }
        }

        out.push_str(&format!("--{}--\r\n", boundary));
        out.into_bytes()
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::new();
    for chunk in encoded.as_bytes().chunks(76) {
        out.push_str(std::str::from_utf8(chunk).unwrap());
        out.push_str("\r\n");
    }
    out
}

/// A minimal valid PDF with `page_count` blank pages.
pub fn build_pdf(page_count: usize) -> Vec<u8> {
    use lopdf::{dictionary, Document, Object};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..page_count)
        .map(|_| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            })
            .into()
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
