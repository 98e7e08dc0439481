//! 学生列表页与表单页

use std::fmt::Write;
use validator::ValidationErrors;

use super::model::{BloodGroup, Gender, StudentFields, StudentRecord};
use crate::app::layout::{escape, page, Notice};
use crate::infrastructure::identity::AuthUser;

/// 表单页的三种模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode<'a> {
    Add,
    Edit(&'a str),
    View(&'a str),
}

impl FormMode<'_> {
    fn title(&self) -> &'static str {
        match self {
            FormMode::Add => "Add New Student",
            FormMode::Edit(_) => "Edit Student",
            FormMode::View(_) => "View Student",
        }
    }

    fn read_only(&self) -> bool {
        matches!(self, FormMode::View(_))
    }
}

enum Input {
    Text,
    Email,
    Tel,
    Date,
    Area,
    BloodGroup,
    Gender,
}

/// (表单名, 校验字段名, 标签, 输入类型)
const FIELDS: [(&str, &str, &str, Input); 12] = [
    ("name", "name", "Name", Input::Text),
    ("class", "class_name", "Class", Input::Text),
    ("section", "section", "Section", Input::Text),
    ("rollNumber", "roll_number", "Roll Number", Input::Text),
    ("address", "address", "Address", Input::Area),
    ("phone", "phone", "Phone", Input::Tel),
    ("email", "email", "Email", Input::Email),
    ("parentName", "parent_name", "Parent Name", Input::Text),
    ("parentPhone", "parent_phone", "Parent Phone", Input::Tel),
    ("dateOfBirth", "date_of_birth", "Date of Birth", Input::Date),
    ("bloodGroup", "blood_group", "Blood Group", Input::BloodGroup),
    ("gender", "gender", "Gender", Input::Gender),
];

fn value<'a>(fields: &'a StudentFields, key: &str) -> &'a str {
    match key {
        "name" => &fields.name,
        "class_name" => &fields.class_name,
        "section" => &fields.section,
        "roll_number" => &fields.roll_number,
        "address" => &fields.address,
        "phone" => &fields.phone,
        "email" => &fields.email,
        "parent_name" => &fields.parent_name,
        "parent_phone" => &fields.parent_phone,
        "date_of_birth" => &fields.date_of_birth,
        "blood_group" => &fields.blood_group,
        "gender" => &fields.gender,
        _ => "",
    }
}

fn select(html: &mut String, name: &str, current: &str, disabled: &str, options: &[(&str, &str)]) {
    let _ = write!(html, "<select id=\"{name}\" name=\"{name}\" required{disabled}>");
    html.push_str("<option value=\"\">Select</option>");
    for (value, label) in options {
        let selected = if *value == current { " selected" } else { "" };
        let _ = write!(
            html,
            "<option value=\"{}\"{}>{}</option>",
            escape(value),
            selected,
            escape(label)
        );
    }
    html.push_str("</select>");
}

/// 学生列表
pub fn list_page(user: &AuthUser, notice: Option<Notice>, records: &[StudentRecord]) -> String {
    let mut body = String::new();
    body.push_str(
        "<div style=\"display:flex;justify-content:space-between;align-items:center\">\
         <h1>Students</h1><a href=\"/students/new\"><button type=\"button\">Add Student</button></a></div>",
    );
    body.push_str(
        "<table><thead><tr><th>ID</th><th>Name</th><th>Class</th><th>Section</th>\
         <th>Roll Number</th><th>Actions</th></tr></thead><tbody>",
    );
    if records.is_empty() {
        body.push_str("<tr><td colspan=\"6\">No students found</td></tr>");
    }
    for record in records {
        let id = escape(&record.id);
        let _ = write!(
            body,
            "<tr><td>{id}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>\
             <a href=\"/students/{id}\">View</a> \
             <a href=\"/students/{id}/edit\">Edit</a> \
             <a href=\"/students/{id}/delete\">Delete</a></td></tr>",
            escape(&record.fields.name),
            escape(&record.fields.class_name),
            escape(&record.fields.section),
            escape(&record.fields.roll_number),
        );
    }
    body.push_str("</tbody></table>");
    page("Students", Some(user), notice, &body)
}

/// 新增、编辑、查看共用的表单页
pub fn form_page(
    user: &AuthUser,
    mode: FormMode<'_>,
    fields: &StudentFields,
    errors: Option<&ValidationErrors>,
    notice: Option<Notice>,
) -> String {
    let field_errors = errors.map(|e| e.field_errors()).unwrap_or_default();
    let disabled = if mode.read_only() { " disabled" } else { "" };

    let mut body = String::new();
    let _ = write!(body, "<h1>{}</h1>", mode.title());
    match mode {
        FormMode::Add => body.push_str("<form method=\"post\" action=\"/students\">"),
        FormMode::Edit(id) => {
            let _ = write!(body, "<form method=\"post\" action=\"/students/{}\">", escape(id));
        }
        FormMode::View(_) => body.push_str("<form>"),
    }

    for (name, key, label, input) in &FIELDS {
        let current = value(fields, key);
        let _ = write!(body, "<label for=\"{name}\">{label}</label>");
        match input {
            Input::Area => {
                let _ = write!(
                    body,
                    "<textarea id=\"{name}\" name=\"{name}\" required{disabled}>{}</textarea>",
                    escape(current)
                );
            }
            Input::BloodGroup => {
                let options: Vec<(&str, &str)> =
                    BloodGroup::ALL.iter().map(|g| (g.as_str(), g.as_str())).collect();
                select(&mut body, name, current, disabled, &options);
            }
            Input::Gender => {
                let options: Vec<(&str, &str)> =
                    Gender::ALL.iter().map(|g| (g.as_str(), g.label())).collect();
                select(&mut body, name, current, disabled, &options);
            }
            Input::Text | Input::Email | Input::Tel | Input::Date => {
                let kind = match input {
                    Input::Email => "email",
                    Input::Tel => "tel",
                    Input::Date => "date",
                    _ => "text",
                };
                let _ = write!(
                    body,
                    "<input type=\"{kind}\" id=\"{name}\" name=\"{name}\" value=\"{}\" required{disabled}>",
                    escape(current)
                );
            }
        }
        if let Some(errs) = field_errors.get(*key) {
            for err in errs.iter() {
                let message = err.message.as_deref().unwrap_or("Invalid value");
                let _ = write!(body, "<div class=\"field-error\">{}</div>", escape(message));
            }
        }
    }

    body.push_str("<div class=\"actions\">");
    match mode {
        FormMode::Add => body.push_str(
            "<button type=\"submit\">Add Student</button><a href=\"/students\">Cancel</a>",
        ),
        FormMode::Edit(_) => body.push_str(
            "<button type=\"submit\">Update Student</button><a href=\"/students\">Cancel</a>",
        ),
        FormMode::View(_) => body.push_str("<a href=\"/students\">Close</a>"),
    }
    body.push_str("</div></form>");
    page(mode.title(), Some(user), notice, &body)
}

/// 删除确认页
pub fn delete_page(user: &AuthUser, record: &StudentRecord) -> String {
    let body = format!(
        "<h1>Delete Student</h1>\
         <p>Are you sure you want to delete <strong>{name}</strong>?</p>\
         <form method=\"post\" action=\"/students/{id}/delete\" class=\"actions\">\
         <button type=\"submit\">Delete</button><a href=\"/students\">Cancel</a></form>",
        name = escape(&record.fields.name),
        id = escape(&record.id),
    );
    page("Delete Student", Some(user), None, &body)
}

pub fn not_found_page(user: &AuthUser, id: &str) -> String {
    let body = format!(
        "<h1>Student not found</h1><p>No student with id {}.</p><a href=\"/students\">Back</a>",
        escape(id)
    );
    page("Student not found", Some(user), None, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    fn user() -> AuthUser {
        AuthUser {
            uid: "u".to_string(),
            email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_list_escapes_names() {
        let record = StudentRecord {
            id: "s1".to_string(),
            fields: StudentFields {
                name: "<b>Ann</b>".to_string(),
                ..Default::default()
            },
            created_at: None,
            updated_at: None,
        };
        let html = list_page(&user(), None, &[record]);
        assert!(html.contains("&lt;b&gt;Ann&lt;/b&gt;"));
        assert!(html.contains("/students/s1/edit"));
        assert!(html.contains("Add Student"));
    }

    #[test]
    fn test_form_modes() {
        let fields = StudentFields::default();
        let add = form_page(&user(), FormMode::Add, &fields, None, None);
        assert!(add.contains("Add New Student") && add.contains("Cancel"));

        let edit = form_page(&user(), FormMode::Edit("s1"), &fields, None, None);
        assert!(edit.contains("Update Student") && edit.contains("action=\"/students/s1\""));

        let view = form_page(&user(), FormMode::View("s1"), &fields, None, None);
        assert!(view.contains("Close") && view.contains(" disabled"));
        assert!(!view.contains("Update Student") && !view.contains("Add Student<"));
    }

    #[test]
    fn test_form_shows_field_errors() {
        let fields = StudentFields::default();
        let errors = fields.validate().unwrap_err();
        let html = form_page(&user(), FormMode::Add, &fields, Some(&errors), None);
        assert!(html.contains("Roll number is required"));
        assert!(html.contains("Select a blood group"));
    }
}
