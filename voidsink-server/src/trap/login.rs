use serde::Deserialize;

const HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Administration Login</title>
    <style>
        body { font-family: sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; background-color: #f0f2f5; }
        .login-container { background: white; padding: 2rem; border-radius: 8px; box-shadow: 0 4px 6px rgba(0,0,0,0.1); width: 300px; }
        h2 { text-align: center; color: #333; }
        input { width: 100%; padding: 10px; margin: 10px 0; border: 1px solid #ddd; border-radius: 4px; box-sizing: border-box; }
        button { width: 100%; padding: 10px; background-color: #007bff; color: white; border: none; border-radius: 4px; cursor: pointer; }
        button:hover { background-color: #0056b3; }
        .error { color: red; text-align: center; margin-bottom: 10px; font-size: 0.9em; }
    </style>
</head>
<body>
    <div class="login-container">
        <h2>Admin Panel</h2>
"#;

const ERROR: &str = "        <div class=\"error\">Invalid username or password</div>\n";

const FORM: &str = r#"        <form method="POST">
            <input type="text" name="username" placeholder="Username" required>
            <input type="password" name="password" placeholder="Password" required>
            <button type="submit">Login</button>
        </form>
    </div>
</body>
</html>"#;

/// Submitted login form. Missing fields read as empty.
#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
	#[serde(default)]
	pub username: String,
	#[serde(default)]
	pub password: String,
}

impl LoginForm {
	/// Whether anything worth recording was submitted.
	pub fn is_empty(&self) -> bool {
		self.username.is_empty() && self.password.is_empty()
	}
}

/// The login page, with the rejection banner when `failed`.
///
/// Every submission is rejected, so a bot keeps trying.
pub fn render(failed: bool) -> String {
	let mut page = String::with_capacity(HEAD.len() + ERROR.len() + FORM.len());
	page.push_str(HEAD);
	if failed {
		page.push_str(ERROR);
	}
	page.push_str(FORM);
	page
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn error_banner_only_after_a_submission() {
		assert!(!render(false).contains("Invalid username or password"));
		let failed = render(true);
		assert!(failed.contains("Invalid username or password"));
		assert!(failed.contains(r#"<form method="POST">"#));
	}

	#[test]
	fn partial_form_is_accepted() {
		let form: LoginForm = serde_json::from_str(r#"{"password":"hunter2"}"#).unwrap();
		assert_eq!(form.username, "");
		assert!(!form.is_empty());
		assert!(LoginForm::default().is_empty());
	}
}
