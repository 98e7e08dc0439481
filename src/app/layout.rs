//! 页面外壳与提示消息

use std::fmt::Write;

use crate::infrastructure::identity::AuthUser;

/// 通过 `?notice=` 在重定向之间传递的提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    LoggedIn,
    InvalidCredentials,
    LoggedOut,
    LogoutFailed,
    StudentAdded,
    StudentUpdated,
    StudentDeleted,
    SaveFailed,
    DeleteFailed,
}

impl Notice {
    const ALL: [Notice; 9] = [
        Notice::LoggedIn,
        Notice::InvalidCredentials,
        Notice::LoggedOut,
        Notice::LogoutFailed,
        Notice::StudentAdded,
        Notice::StudentUpdated,
        Notice::StudentDeleted,
        Notice::SaveFailed,
        Notice::DeleteFailed,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Notice::LoggedIn => "logged_in",
            Notice::InvalidCredentials => "invalid_credentials",
            Notice::LoggedOut => "logged_out",
            Notice::LogoutFailed => "logout_failed",
            Notice::StudentAdded => "student_added",
            Notice::StudentUpdated => "student_updated",
            Notice::StudentDeleted => "student_deleted",
            Notice::SaveFailed => "save_failed",
            Notice::DeleteFailed => "delete_failed",
        }
    }

    /// 未知的代码直接忽略
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.code() == code)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Notice::LoggedIn => "Successfully logged in",
            Notice::InvalidCredentials => "Invalid credentials",
            Notice::LoggedOut => "Successfully logged out",
            Notice::LogoutFailed => "Failed to logout",
            Notice::StudentAdded => "Student added successfully",
            Notice::StudentUpdated => "Student updated successfully",
            Notice::StudentDeleted => "Student deleted successfully",
            Notice::SaveFailed => "Failed to save student",
            Notice::DeleteFailed => "Failed to delete student",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notice::InvalidCredentials
                | Notice::LogoutFailed
                | Notice::SaveFailed
                | Notice::DeleteFailed
        )
    }

    /// 带提示的重定向目标
    pub fn redirect_to(&self, path: &str) -> String {
        format!("{}?notice={}", path, self.code())
    }
}

/// `?notice=` 查询参数
#[derive(Debug, Default, serde::Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

impl NoticeQuery {
    pub fn notice(&self) -> Option<Notice> {
        self.notice.as_deref().and_then(Notice::from_code)
    }
}

/// HTML 转义
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;margin:0;background:#f5f5f5}\
header{display:flex;justify-content:space-between;align-items:center;padding:12px 24px;background:#1f2937;color:#fff}\
header a{color:#fff;text-decoration:none;font-weight:bold}\
main{max-width:960px;margin:24px auto;background:#fff;padding:24px;border-radius:6px}\
table{width:100%;border-collapse:collapse}th,td{text-align:left;padding:8px;border-bottom:1px solid #e5e7eb}\
.notice{padding:10px 14px;margin-bottom:16px;border-radius:4px;background:#dcfce7}\
.notice.error{background:#fee2e2}.field-error{color:#b91c1c;font-size:0.85em}\
label{display:block;margin-top:10px}input,select,textarea{width:100%;padding:6px;box-sizing:border-box}\
.actions{margin-top:16px;display:flex;gap:8px}";

/// 渲染完整页面
pub fn page(title: &str, user: Option<&AuthUser>, notice: Option<Notice>, body: &str) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{title} - Student Admin</title><style>{STYLE}</style></head><body>",
        title = escape(title),
    );
    html.push_str("<header><a href=\"/students\">Students</a>");
    if let Some(user) = user {
        let _ = write!(
            html,
            "<div><span>{}</span> <form method=\"post\" action=\"/logout\" style=\"display:inline\">\
             <button type=\"submit\">Logout</button></form></div>",
            escape(&user.email),
        );
    }
    html.push_str("</header><main>");
    if let Some(notice) = notice {
        let class = if notice.is_error() { "notice error" } else { "notice" };
        let _ = write!(html, "<div class=\"{}\">{}</div>", class, notice.message());
    }
    html.push_str(body);
    html.push_str("</main></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<a href=\"x\">Tom & Jerry's</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_notice_codes_round_trip() {
        for notice in Notice::ALL {
            assert_eq!(Notice::from_code(notice.code()), Some(notice));
        }
        assert_eq!(Notice::from_code("bogus"), None);
    }

    #[test]
    fn test_page_shows_logout_only_when_signed_in() {
        let user = AuthUser {
            uid: "u".to_string(),
            email: "a@example.com".to_string(),
        };
        assert!(page("x", Some(&user), None, "").contains("action=\"/logout\""));
        assert!(!page("x", None, None, "").contains("action=\"/logout\""));
    }
}
