mod dispatcher;
mod worker;

pub(crate) use dispatcher::Dispatcher;
