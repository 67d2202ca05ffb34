fn main() {
    reward_service_lib::run()
}
