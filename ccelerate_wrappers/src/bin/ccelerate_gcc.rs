fn main() {
    ccelerate_wrappers::wrap_command(ccelerate_shared::WrappedBinary::Gcc);
}
