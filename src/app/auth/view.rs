//! 登录页

use crate::app::layout::{escape, page, Notice};

pub fn login_page(notice: Option<Notice>, email: &str) -> String {
    let body = format!(
        "<h1>Admin Login</h1>\
         <form method=\"post\" action=\"/\">\
         <label for=\"email\">Email</label>\
         <input type=\"email\" id=\"email\" name=\"email\" value=\"{}\" required>\
         <label for=\"password\">Password</label>\
         <input type=\"password\" id=\"password\" name=\"password\" required>\
         <div class=\"actions\"><button type=\"submit\">Login</button></div></form>",
        escape(email)
    );
    page("Login", None, notice, &body)
}
