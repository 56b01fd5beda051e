use crate::translator::Translator;

pub(crate) struct ServerState<O, T> {
    pub(crate) translator: Translator<O, T>,
}
