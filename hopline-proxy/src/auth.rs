use hopline_net::Command;

pub trait Authentication: Send + Sync {
    fn allow(&self, command: Command, username: &str) -> bool;
}

impl<F> Authentication for F
where
    F: Fn(Command, &str) -> bool + Send + Sync,
{
    fn allow(&self, command: Command, username: &str) -> bool {
        self(command, username)
    }
}

pub struct UserAuth {
    username: String,
}

impl UserAuth {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl Authentication for UserAuth {
    fn allow(&self, _command: Command, username: &str) -> bool {
        username == self.username
    }
}

pub struct UsernameFilter<F>(pub F);

impl<F> Authentication for UsernameFilter<F>
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn allow(&self, _command: Command, username: &str) -> bool {
        (self.0)(username)
    }
}
